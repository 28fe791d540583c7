//! Randomly generated VPN logins and their `chap-secrets` representation.

use std::fmt;

use rand::Rng;

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Username length, including the leading letter.
pub const USERNAME_LENGTH: usize = 8;

/// Password length.
pub const PASSWORD_LENGTH: usize = 12;

/// PPTP username and password.
#[derive(Clone, Eq, PartialEq)]
pub struct VpnLogin {
    /// Username; always starts with a letter.
    pub username: String,
    /// Password.
    pub password: String,
}

impl VpnLogin {
    /// Generates a login from the thread-local random generator.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Generates a login from the supplied generator.
    pub fn generate_with<G: Rng + ?Sized>(rng: &mut G) -> Self {
        let mut username = String::with_capacity(USERNAME_LENGTH);
        username.push(pick(rng, LETTERS));
        username.extend((1..USERNAME_LENGTH).map(|_| pick(rng, ALPHANUMERIC)));
        let password = (0..PASSWORD_LENGTH)
            .map(|_| pick(rng, ALPHANUMERIC))
            .collect();
        Self { username, password }
    }

    /// Formats the login as a `chap-secrets` line accepting any server and
    /// any client address.
    #[must_use]
    pub fn chap_secrets_line(&self) -> String {
        format!("{} * {} *", self.username, self.password)
    }

    /// Reads the first login from `chap-secrets` contents, skipping blank
    /// lines and comments.
    #[must_use]
    pub fn parse_chap_secrets(contents: &str) -> Option<Self> {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .find_map(|line| {
                let mut fields = line.split_whitespace();
                let username = fields.next()?;
                let _server = fields.next()?;
                let password = fields.next()?;
                Some(Self {
                    username: username.to_owned(),
                    password: password.to_owned(),
                })
            })
    }
}

impl fmt::Debug for VpnLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VpnLogin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn pick<G: Rng + ?Sized>(rng: &mut G, alphabet: &[u8]) -> char {
    let index = rng.gen_range(0..alphabet.len());
    alphabet.get(index).copied().map_or('x', char::from)
}
