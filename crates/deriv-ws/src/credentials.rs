//! API token handling.
//!
//! Tokens are checked for shape before any authentication attempt. The
//! diagnostic never contains the raw token, only counts and a masked preview.

use deriv_core::AccountType;
use std::fmt;

/// Expected token length.
pub const TOKEN_LENGTH: usize = 15;
/// Minimum number of ASCII letters in a token.
pub const MIN_TOKEN_LETTERS: usize = 10;
/// Prefix of placeholder tokens shipped in sample configuration.
pub const PLACEHOLDER_PREFIX: &str = "placeholder_";

/// Per-account API tokens.
#[derive(Clone, Default)]
pub struct Credentials {
    demo: Option<String>,
    real: Option<String>,
}

impl Credentials {
    pub fn new(demo: Option<String>, real: Option<String>) -> Self {
        Self {
            demo: demo.filter(|t| !t.is_empty()),
            real: real.filter(|t| !t.is_empty()),
        }
    }

    pub fn token(&self, account: AccountType) -> Option<&str> {
        match account {
            AccountType::Demo => self.demo.as_deref(),
            AccountType::Real => self.real.as_deref(),
        }
    }

    /// Diagnostic for the token of `account` (empty when missing).
    pub fn diagnose(&self, account: AccountType) -> TokenDiagnostic {
        TokenDiagnostic::inspect(self.token(account).unwrap_or(""))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("demo", &self.demo.as_deref().map(mask_token))
            .field("real", &self.real.as_deref().map(mask_token))
            .finish()
    }
}

/// Shape report for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDiagnostic {
    pub length: usize,
    pub letters: usize,
    pub digits: usize,
    pub special: usize,
    pub placeholder: bool,
    pub preview: String,
    pub problems: Vec<String>,
}

impl TokenDiagnostic {
    pub fn inspect(token: &str) -> Self {
        let length = token.chars().count();
        let letters = token.chars().filter(|c| c.is_ascii_alphabetic()).count();
        let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
        let special = length - letters - digits;
        let placeholder = token.starts_with(PLACEHOLDER_PREFIX);

        let mut problems = Vec::new();
        if token.is_empty() {
            problems.push("Token is empty".to_string());
        } else if !placeholder {
            if length != TOKEN_LENGTH {
                problems.push(format!(
                    "Token length is {length}, expected {TOKEN_LENGTH}"
                ));
            }
            if special > 0 {
                problems.push(format!("Token contains {special} non-alphanumeric characters"));
            }
            if letters < MIN_TOKEN_LETTERS {
                problems.push(format!(
                    "Token has {letters} letters, expected at least {MIN_TOKEN_LETTERS}"
                ));
            }
            if digits == 0 {
                problems.push("Token has no digits".to_string());
            }
        }

        Self {
            length,
            letters,
            digits,
            special,
            placeholder,
            preview: mask_token(token),
            problems,
        }
    }

    /// Whether the token has an acceptable shape (placeholders included).
    pub fn is_acceptable(&self) -> bool {
        self.problems.is_empty()
    }
}

impl fmt::Display for TokenDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.length == 0 {
            return f.write_str("Token is empty");
        }
        write!(
            f,
            "length={} letters={} digits={} special={} format={} preview={}",
            self.length,
            self.letters,
            self.digits,
            self.special,
            if self.is_acceptable() { "ok" } else { "invalid" },
            self.preview
        )?;
        if self.placeholder {
            f.write_str(" (placeholder)")?;
        }
        if !self.problems.is_empty() {
            write!(f, " [{}]", self.problems.join("; "))?;
        }
        Ok(())
    }
}

/// Shape check used before authenticating.
pub fn validate_token(token: &str) -> Result<(), TokenDiagnostic> {
    let diagnostic = TokenDiagnostic::inspect(token);
    if diagnostic.is_acceptable() {
        Ok(())
    } else {
        Err(diagnostic)
    }
}

/// First and last three characters with `*` in between; `***` for short tokens.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 6))
}
