//! Supported page languages.
//! The set is closed; `En` is the language the markup is authored in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A locale the site can be displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    En,
    Hi,
    Bn,
    Ta,
    Te,
    Mr,
    Gu,
    Kn,
    Ml,
    Pa,
    Ur,
}

impl LanguageCode {
    /// The language static markup is written in. Translating to it is a restore.
    pub const SOURCE: LanguageCode = LanguageCode::En;

    pub const ALL: [LanguageCode; 11] = [
        LanguageCode::En,
        LanguageCode::Hi,
        LanguageCode::Bn,
        LanguageCode::Ta,
        LanguageCode::Te,
        LanguageCode::Mr,
        LanguageCode::Gu,
        LanguageCode::Kn,
        LanguageCode::Ml,
        LanguageCode::Pa,
        LanguageCode::Ur,
    ];

    pub fn is_source(self) -> bool {
        self == Self::SOURCE
    }

    /// ISO 639-1 code, as sent to the gateway.
    pub fn code(self) -> &'static str {
        match self {
            LanguageCode::En => "en",
            LanguageCode::Hi => "hi",
            LanguageCode::Bn => "bn",
            LanguageCode::Ta => "ta",
            LanguageCode::Te => "te",
            LanguageCode::Mr => "mr",
            LanguageCode::Gu => "gu",
            LanguageCode::Kn => "kn",
            LanguageCode::Ml => "ml",
            LanguageCode::Pa => "pa",
            LanguageCode::Ur => "ur",
        }
    }

    /// Endonym shown in the language picker.
    pub fn native_name(self) -> &'static str {
        match self {
            LanguageCode::En => "English",
            LanguageCode::Hi => "हिन्दी",
            LanguageCode::Bn => "বাংলা",
            LanguageCode::Ta => "தமிழ்",
            LanguageCode::Te => "తెలుగు",
            LanguageCode::Mr => "मराठी",
            LanguageCode::Gu => "ગુજરાતી",
            LanguageCode::Kn => "ಕನ್ನಡ",
            LanguageCode::Ml => "മലയാളം",
            LanguageCode::Pa => "ਪੰਜਾਬੀ",
            LanguageCode::Ur => "اردو",
        }
    }
}

impl Default for LanguageCode {
    fn default() -> Self {
        Self::SOURCE
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLanguage(pub String);

impl fmt::Display for UnknownLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported language code: {}", self.0)
    }
}

impl std::error::Error for UnknownLanguage {}

impl FromStr for LanguageCode {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        LanguageCode::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}
