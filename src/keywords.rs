//! Built-in keywords shipped with the engine bundle

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ArgumentError;

/// A keyword whose `.ppn` file ships in the resource bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BuiltinKeyword {
    Alexa,
    Americano,
    Blueberry,
    Bumblebee,
    Computer,
    Grapefruit,
    Grasshopper,
    HeyBarista,
    HeyGoogle,
    HeySiri,
    Jarvis,
    OkGoogle,
    Picovoice,
    Porcupine,
    Terminator,
}

impl BuiltinKeyword {
    pub const ALL: [BuiltinKeyword; 15] = [
        BuiltinKeyword::Alexa,
        BuiltinKeyword::Americano,
        BuiltinKeyword::Blueberry,
        BuiltinKeyword::Bumblebee,
        BuiltinKeyword::Computer,
        BuiltinKeyword::Grapefruit,
        BuiltinKeyword::Grasshopper,
        BuiltinKeyword::HeyBarista,
        BuiltinKeyword::HeyGoogle,
        BuiltinKeyword::HeySiri,
        BuiltinKeyword::Jarvis,
        BuiltinKeyword::OkGoogle,
        BuiltinKeyword::Picovoice,
        BuiltinKeyword::Porcupine,
        BuiltinKeyword::Terminator,
    ];

    /// Name as it appears in keyword file names (`hey google_linux.ppn`).
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinKeyword::Alexa => "alexa",
            BuiltinKeyword::Americano => "americano",
            BuiltinKeyword::Blueberry => "blueberry",
            BuiltinKeyword::Bumblebee => "bumblebee",
            BuiltinKeyword::Computer => "computer",
            BuiltinKeyword::Grapefruit => "grapefruit",
            BuiltinKeyword::Grasshopper => "grasshopper",
            BuiltinKeyword::HeyBarista => "hey barista",
            BuiltinKeyword::HeyGoogle => "hey google",
            BuiltinKeyword::HeySiri => "hey siri",
            BuiltinKeyword::Jarvis => "jarvis",
            BuiltinKeyword::OkGoogle => "ok google",
            BuiltinKeyword::Picovoice => "picovoice",
            BuiltinKeyword::Porcupine => "porcupine",
            BuiltinKeyword::Terminator => "terminator",
        }
    }
}

impl fmt::Display for BuiltinKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuiltinKeyword {
    type Err = ArgumentError;

    /// Case-insensitive; `hey_google` and `hey-google` are accepted for `hey google`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");

        BuiltinKeyword::ALL
            .iter()
            .copied()
            .find(|keyword| keyword.as_str() == normalized)
            .ok_or_else(|| ArgumentError::UnknownKeyword(s.to_string()))
    }
}

impl TryFrom<String> for BuiltinKeyword {
    type Error = ArgumentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BuiltinKeyword> for String {
    fn from(keyword: BuiltinKeyword) -> Self {
        keyword.as_str().to_string()
    }
}
