use std::fmt;

#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: Vec<u8>,
    pub password: Vec<u8>,
}

impl Credentials {
    ///
    ///
    ///
    pub fn new<S: Into<Vec<u8>>>(
        username: S,
        password: S,
    ) -> Self {
        let username = username.into();
        let password = password.into();

        Credentials { username, password }
    }

    /// Byte-exact comparison, an empty value only matches an empty value.
    pub fn matches(
        &self,
        username: &[u8],
        password: &[u8],
    ) -> bool {
        self.username == username && self.password == password
    }

    /// Encodes as `ULEN UNAME PLEN PASSWD`, without the leading version byte.
    pub fn as_socks_bytes(&self) -> Vec<u8> {
        // Append username
        let mut bytes = vec![self.username.len() as u8];
        bytes.extend(self.username.iter());

        // Append password
        bytes.push(self.password.len() as u8);
        bytes.extend(self.password.iter());

        bytes
    }
}

impl fmt::Debug for Credentials {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("password", &"<redacted>")
            .finish()
    }
}
