//! Secret policies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Special characters accepted in secrets.
///
/// Restricted to characters that survive YAML, `.env` files and shell
/// quoting without escaping.
pub const SPECIAL_CHARS: &str = "!%*+,-.:=?@^_~";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharClass {
    Upper,
    Lower,
    Digit,
    Special,
}

impl CharClass {
    pub const ALL: [CharClass; 4] = [
        CharClass::Upper,
        CharClass::Lower,
        CharClass::Digit,
        CharClass::Special,
    ];

    pub fn alphabet(self) -> &'static [u8] {
        match self {
            CharClass::Upper => b"ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            CharClass::Lower => b"abcdefghijklmnopqrstuvwxyz",
            CharClass::Digit => b"0123456789",
            CharClass::Special => SPECIAL_CHARS.as_bytes(),
        }
    }

    pub fn of(c: char) -> Option<CharClass> {
        CharClass::ALL
            .into_iter()
            .find(|class| c.is_ascii() && class.alphabet().contains(&(c as u8)))
    }
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CharClass::Upper => "uppercase letter",
            CharClass::Lower => "lowercase letter",
            CharClass::Digit => "digit",
            CharClass::Special => "special character",
        };
        f.write_str(name)
    }
}

/// Length and character-class requirements for a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPolicy {
    pub min_length: usize,
    /// Length of generated secrets; never below `min_length`.
    pub target_length: usize,
    pub required: Vec<CharClass>,
}

impl SecretPolicy {
    /// Administrative and database passwords.
    pub fn password() -> Self {
        Self {
            min_length: 12,
            target_length: 24,
            required: CharClass::ALL.to_vec(),
        }
    }

    /// Signing-key passphrases.
    pub fn passphrase() -> Self {
        Self {
            min_length: 16,
            target_length: 32,
            required: CharClass::ALL.to_vec(),
        }
    }

    /// Concatenation of every class alphabet, in class order.
    pub fn full_alphabet(&self) -> Vec<u8> {
        CharClass::ALL
            .into_iter()
            .flat_map(|class| class.alphabet().iter().copied())
            .collect()
    }

    /// Length a generator should produce.
    pub fn generated_length(&self) -> usize {
        self.target_length
            .max(self.min_length)
            .max(self.required.len())
    }

    /// Every way `candidate` falls short of this policy.
    pub fn violations(&self, candidate: &str) -> Vec<String> {
        let mut problems = Vec::new();

        let length = candidate.chars().count();
        if length < self.min_length {
            problems.push(format!(
                "must be at least {} characters (got {})",
                self.min_length, length
            ));
        }

        let mut present = Vec::new();
        let mut foreign = false;
        for c in candidate.chars() {
            match CharClass::of(c) {
                Some(class) if !present.contains(&class) => present.push(class),
                Some(_) => {}
                None => foreign = true,
            }
        }

        for class in &self.required {
            if !present.contains(class) {
                problems.push(format!("must contain at least one {}", class));
            }
        }

        if foreign {
            problems.push(format!(
                "may only contain letters, digits and {}",
                SPECIAL_CHARS
            ));
        }

        problems
    }

    pub fn summary(&self) -> String {
        let classes: Vec<String> = self.required.iter().map(ToString::to_string).collect();
        format!("min {} chars; {}", self.min_length, classes.join(", "))
    }
}

/// Whether `candidate` satisfies `policy`.
///
/// Generated and operator-supplied secrets go through the same check.
pub fn validate(candidate: &str, policy: &SecretPolicy) -> bool {
    policy.violations(candidate).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_password_is_rejected() {
        let policy = SecretPolicy::password();
        assert!(!validate("Ab1!", &policy));
        let problems = policy.violations("Ab1!");
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("at least 12"));
    }

    #[test]
    fn test_each_missing_class_is_reported() {
        let problems = SecretPolicy::password().violations("alllowercaseletters");
        assert_eq!(problems.len(), 3);
        assert!(problems.iter().any(|p| p.contains("uppercase")));
        assert!(problems.iter().any(|p| p.contains("digit")));
        assert!(problems.iter().any(|p| p.contains("special")));
    }

    #[test]
    fn test_foreign_characters_are_rejected() {
        let policy = SecretPolicy::password();
        assert!(validate("Abcdefgh12!x", &policy));
        assert!(!validate("Abcdefgh12!x$", &policy));
        assert!(!validate("Abcdefgh12!x é", &policy));
    }

    #[test]
    fn test_passphrase_is_stricter() {
        assert!(validate("Abcdefgh12!x", &SecretPolicy::password()));
        assert!(!validate("Abcdefgh12!x", &SecretPolicy::passphrase()));
    }
}
