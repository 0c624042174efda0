//! Temporary credential generation and password hashing.

use std::fmt;

use argon2::{
    password_hash::{rand_core::OsRng as HashRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use breakwise_config::PasswordConfig;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::AuthError;

/// Alphabet the generator maps random bytes onto.
pub const PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*";
pub const PASSWORD_SYMBOLS: &str = "!@#$%^&*";
pub const MIN_PASSWORD_LENGTH: usize = 4;
pub const DEFAULT_PASSWORD_LENGTH: usize = 12;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password length {length} is below the minimum of {min}")]
    InvalidLength { length: usize, min: usize },
    #[error("no password covering every character class after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterClass {
    Lowercase,
    Uppercase,
    Digit,
    Symbol,
}

impl CharacterClass {
    pub const ALL: [CharacterClass; 4] = [
        CharacterClass::Lowercase,
        CharacterClass::Uppercase,
        CharacterClass::Digit,
        CharacterClass::Symbol,
    ];

    pub fn of(c: char) -> Option<Self> {
        if c.is_ascii_lowercase() {
            Some(CharacterClass::Lowercase)
        } else if c.is_ascii_uppercase() {
            Some(CharacterClass::Uppercase)
        } else if c.is_ascii_digit() {
            Some(CharacterClass::Digit)
        } else if PASSWORD_SYMBOLS.contains(c) {
            Some(CharacterClass::Symbol)
        } else {
            None
        }
    }

    fn bit(self) -> u8 {
        match self {
            CharacterClass::Lowercase => 0b0001,
            CharacterClass::Uppercase => 0b0010,
            CharacterClass::Digit => 0b0100,
            CharacterClass::Symbol => 0b1000,
        }
    }
}

/// Whether `candidate` contains at least one character of every class.
pub fn covers_all_classes(candidate: &str) -> bool {
    let seen = candidate
        .chars()
        .filter_map(CharacterClass::of)
        .fold(0u8, |mask, class| mask | class.bit());
    seen == 0b1111
}

/// A freshly generated credential. Never persisted; `Debug` does not reveal it.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedPassword(String);

impl GeneratedPassword {
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for GeneratedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GeneratedPassword(<{} chars>)", self.0.len())
    }
}

/// Generates random credentials containing lowercase, uppercase, digit and symbol characters.
///
/// Each attempt draws `length` bytes and maps every byte modulo the alphabet
/// size. The slight bias toward the start of the alphabet is accepted. An
/// attempt missing a class is discarded whole, up to `max_attempts` times.
///
/// ```
/// use breakwise_auth::password::{covers_all_classes, PasswordProvisioner};
///
/// let password = PasswordProvisioner::default().generate(12).unwrap();
/// assert_eq!(password.len(), 12);
/// assert!(covers_all_classes(password.expose()));
/// ```
#[derive(Debug, Clone)]
pub struct PasswordProvisioner {
    length: usize,
    max_attempts: u32,
}

impl Default for PasswordProvisioner {
    fn default() -> Self {
        Self {
            length: DEFAULT_PASSWORD_LENGTH,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PasswordProvisioner {
    pub fn new(length: usize, max_attempts: u32) -> Self {
        Self {
            length,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &PasswordConfig) -> Self {
        Self::new(config.length, config.max_attempts)
    }

    pub fn default_length(&self) -> usize {
        self.length
    }

    /// Generate a password with the configured default length.
    pub fn generate_default(&self) -> Result<GeneratedPassword, PasswordError> {
        self.generate(self.length)
    }

    pub fn generate(&self, length: usize) -> Result<GeneratedPassword, PasswordError> {
        self.generate_with(&mut OsRng, length)
    }

    pub fn generate_with<R: RngCore + ?Sized>(
        &self,
        rng: &mut R,
        length: usize,
    ) -> Result<GeneratedPassword, PasswordError> {
        if length < MIN_PASSWORD_LENGTH {
            return Err(PasswordError::InvalidLength {
                length,
                min: MIN_PASSWORD_LENGTH,
            });
        }

        let mut bytes = vec![0u8; length];
        for attempt in 1..=self.max_attempts {
            rng.fill_bytes(&mut bytes);
            let candidate: String = bytes
                .iter()
                .map(|byte| PASSWORD_ALPHABET[*byte as usize % PASSWORD_ALPHABET.len()] as char)
                .collect();

            if covers_all_classes(&candidate) {
                debug!(length, attempt, "generated temporary password");
                return Ok(GeneratedPassword(candidate));
            }
        }

        warn!(length, attempts = self.max_attempts, "password generation exhausted its attempts");
        Err(PasswordError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut HashRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string();
    Ok(hash)
}

/// Verify a password against its hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a fixed byte pattern forever.
    struct ScriptedRng {
        pattern: Vec<u8>,
        cursor: usize,
    }

    impl ScriptedRng {
        fn new(pattern: &[u8]) -> Self {
            Self {
                pattern: pattern.to_vec(),
                cursor: 0,
            }
        }
    }

    impl RngCore for ScriptedRng {
        fn next_u32(&mut self) -> u32 {
            let mut buf = [0u8; 4];
            self.fill_bytes(&mut buf);
            u32::from_le_bytes(buf)
        }

        fn next_u64(&mut self) -> u64 {
            let mut buf = [0u8; 8];
            self.fill_bytes(&mut buf);
            u64::from_le_bytes(buf)
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for byte in dest.iter_mut() {
                *byte = self.pattern[self.cursor % self.pattern.len()];
                self.cursor += 1;
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn test_generated_passwords_cover_every_class() {
        let provisioner = PasswordProvisioner::default();
        for _ in 0..10_000 {
            let password = provisioner.generate(12).unwrap();
            assert_eq!(password.len(), 12);
            let value = password.expose();
            assert!(value.chars().any(|c| c.is_ascii_lowercase()), "{value}");
            assert!(value.chars().any(|c| c.is_ascii_uppercase()), "{value}");
            assert!(value.chars().any(|c| c.is_ascii_digit()), "{value}");
            assert!(value.chars().any(|c| PASSWORD_SYMBOLS.contains(c)), "{value}");
        }
    }

    #[test]
    fn test_short_length_is_rejected() {
        let provisioner = PasswordProvisioner::default();
        assert_eq!(
            provisioner.generate(2),
            Err(PasswordError::InvalidLength { length: 2, min: 4 })
        );
        assert!(provisioner.generate(0).is_err());
    }

    #[test]
    fn test_minimum_length_is_reachable() {
        let password = PasswordProvisioner::default().generate(4).unwrap();
        assert_eq!(password.len(), 4);
        assert!(covers_all_classes(password.expose()));
    }

    #[test]
    fn test_redraw_is_bounded() {
        // Byte 0 always maps to 'a', so no attempt can succeed.
        let provisioner = PasswordProvisioner::new(12, 25);
        let mut rng = ScriptedRng::new(&[0]);

        let result = provisioner.generate_with(&mut rng, 12);

        assert_eq!(result, Err(PasswordError::Exhausted { attempts: 25 }));
        assert_eq!(rng.cursor, 25 * 12);
    }

    #[test]
    fn test_whole_string_is_redrawn() {
        // First draw is all 'a'; second draw hits every class ('a', 'A', '0', '!').
        let mut pattern = vec![0u8; 4];
        pattern.extend_from_slice(&[0, 26, 52, 62]);
        let mut rng = ScriptedRng::new(&pattern);

        let password = PasswordProvisioner::new(4, 5)
            .generate_with(&mut rng, 4)
            .unwrap();

        assert_eq!(password.expose(), "aA0!");
    }

    #[test]
    fn test_bytes_map_modulo_alphabet() {
        // 256 % 70 wraps byte 70 back onto 'a' and byte 96 onto 'A'.
        let mut rng = ScriptedRng::new(&[70, 96, 122, 132]);
        let password = PasswordProvisioner::new(4, 1)
            .generate_with(&mut rng, 4)
            .unwrap();
        assert_eq!(password.expose(), "aA0!");
    }

    #[test]
    fn test_debug_hides_password() {
        let password = PasswordProvisioner::default().generate(12).unwrap();
        let rendered = format!("{password:?}");
        assert!(!rendered.contains(password.expose()));
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("Temp0rary!pass").unwrap();

        assert!(verify_password("Temp0rary!pass", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }
}
