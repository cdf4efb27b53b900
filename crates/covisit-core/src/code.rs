use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of a session code on the wire.
pub const CODE_LEN: usize = 6;

/// Alphabet for generated codes. Uppercase-only so codes survive being
/// read over the phone or retyped.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Short human-typeable session code, e.g. `K7QX2M`.
///
/// Unique among currently active sessions only — a code may be reused after
/// its session is garbage-collected. Case-normalized on construction and
/// deserialization, so clients may type codes in lowercase.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Generate a random code. Pure function of the thread RNG; collision
    /// checks against live sessions are the registry's responsibility.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code: String = (0..CODE_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self::from(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionCode {
    fn from(s: String) -> Self {
        Self(s.trim().to_ascii_uppercase())
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
