// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Decoded SFTP call types
//!
//! The transport layer turns wire packets into [`Operation`] values and turns
//! each [`Reply`] back into exactly one response packet. Numbering follows
//! SFTP protocol version 3 so transports can map codes without a table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// File type mask bits, composed into [`FileAttributes::permissions`]
pub const S_IFMT: u32 = libc::S_IFMT as u32;
pub const S_IFDIR: u32 = libc::S_IFDIR as u32;
pub const S_IFREG: u32 = libc::S_IFREG as u32;
pub const S_IFLNK: u32 = libc::S_IFLNK as u32;

/// SFTP v3 status codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum StatusCode {
    Ok = 0,
    Eof = 1,
    NoSuchFile = 2,
    PermissionDenied = 3,
    Failure = 4,
    BadMessage = 5,
    NoConnection = 6,
    ConnectionLost = 7,
    OpUnsupported = 8,
}

impl StatusCode {
    /// Numeric value carried in the status packet
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => StatusCode::Ok,
            1 => StatusCode::Eof,
            2 => StatusCode::NoSuchFile,
            3 => StatusCode::PermissionDenied,
            4 => StatusCode::Failure,
            5 => StatusCode::BadMessage,
            6 => StatusCode::NoConnection,
            7 => StatusCode::ConnectionLost,
            8 => StatusCode::OpUnsupported,
            _ => return None,
        })
    }

    /// Human-readable message sent alongside the code
    pub fn message(self) -> &'static str {
        match self {
            StatusCode::Ok => "Success",
            StatusCode::Eof => "End of file",
            StatusCode::NoSuchFile => "No such file",
            StatusCode::PermissionDenied => "Permission denied",
            StatusCode::Failure => "Failure",
            StatusCode::BadMessage => "Bad message",
            StatusCode::NoConnection => "No connection",
            StatusCode::ConnectionLost => "Connection lost",
            StatusCode::OpUnsupported => "Operation unsupported",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// SFTP file attributes; absent fields are omitted on the wire
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub size: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub permissions: Option<u32>,
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
}

impl FileAttributes {
    pub fn is_dir(&self) -> bool {
        self.file_type() == Some(S_IFDIR)
    }

    pub fn is_regular_file(&self) -> bool {
        self.file_type() == Some(S_IFREG)
    }

    fn file_type(&self) -> Option<u32> {
        self.permissions.map(|mode| mode & S_IFMT)
    }
}

/// One record of a name reply (readdir, realpath)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEntry {
    pub filename: String,
    pub longname: String,
    pub attrs: FileAttributes,
}

impl NameEntry {
    /// Build an entry whose long name is synthesised `ls -l` style from `attrs`
    pub fn new(filename: impl Into<String>, attrs: FileAttributes) -> Self {
        let filename = filename.into();
        let owner = attrs.uid.unwrap_or(0).to_string();
        let group = attrs.gid.unwrap_or(0).to_string();
        let longname = format_longname(&filename, &attrs, &owner, &group);
        Self {
            filename,
            longname,
            attrs,
        }
    }

    /// Build an entry with a caller-provided long name
    pub fn with_longname(
        filename: impl Into<String>,
        longname: impl Into<String>,
        attrs: FileAttributes,
    ) -> Self {
        Self {
            filename: filename.into(),
            longname: longname.into(),
            attrs,
        }
    }
}

/// Render an `ls -l` line for a directory listing record
pub fn format_longname(name: &str, attrs: &FileAttributes, owner: &str, group: &str) -> String {
    let mode = attrs.permissions.unwrap_or(S_IFREG | 0o644);
    let date = attrs
        .mtime
        .and_then(|mtime| DateTime::<Utc>::from_timestamp(i64::from(mtime), 0))
        .map(|dt| dt.format("%b %d %H:%M").to_string())
        .unwrap_or_else(|| "Jan 01 00:00".to_string());
    format!(
        "{} {:>4} {:<8} {:<8} {:>8} {} {}",
        permission_string(mode),
        1,
        owner,
        group,
        attrs.size.unwrap_or(0),
        date,
        name
    )
}

/// `drwxr-xr-x`-style rendering of a mode value
pub fn permission_string(mode: u32) -> String {
    let mut s = String::with_capacity(10);
    s.push(match mode & S_IFMT {
        m if m == S_IFDIR => 'd',
        m if m == S_IFLNK => 'l',
        _ => '-',
    });
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    s
}

/// Opaque handle identifier, unique within one session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u32);

impl HandleId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Wire form of the handle: a 4-byte big-endian string
    pub fn to_bytes(self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }

    /// Parse a handle string sent back by the client
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 4] = bytes.try_into().ok()?;
        Some(Self(u32::from_be_bytes(raw)))
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => f.write_str("IPv4"),
            AddressFamily::Ipv6 => f.write_str("IPv6"),
        }
    }
}

/// Remote endpoint of a transport connection, delivered once per connection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub address: IpAddr,
    pub port: u16,
    /// Client identification string from the SSH version exchange
    pub client_ident: String,
}

impl RemoteInfo {
    pub fn new(addr: SocketAddr, client_ident: impl Into<String>) -> Self {
        Self {
            address: addr.ip(),
            port: addr.port(),
            client_ident: client_ident.into(),
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self.address {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl fmt::Display for RemoteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// SSH user authentication methods, named as on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthMethod {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "publickey")]
    PublicKey,
    #[serde(rename = "keyboard-interactive")]
    KeyboardInteractive,
    #[serde(rename = "hostbased")]
    HostBased,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Password => "password",
            AuthMethod::PublicKey => "publickey",
            AuthMethod::KeyboardInteractive => "keyboard-interactive",
            AuthMethod::HostBased => "hostbased",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AuthMethod::None),
            "password" => Ok(AuthMethod::Password),
            "publickey" => Ok(AuthMethod::PublicKey),
            "keyboard-interactive" => Ok(AuthMethod::KeyboardInteractive),
            "hostbased" => Ok(AuthMethod::HostBased),
            _ => Err(format!("Unknown authentication method: {}", s)),
        }
    }
}

/// One user authentication attempt
#[derive(Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub method: AuthMethod,
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("method", &self.method)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Answer to an authentication attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthResult {
    Accepted { username: String },
    /// Rejected; `methods` lists the methods that may still be tried
    Rejected { methods: Vec<AuthMethod> },
}

/// SFTP verbs understood by the dispatcher
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Open,
    Close,
    Read,
    Write,
    Lstat,
    Fstat,
    Setstat,
    Fsetstat,
    Opendir,
    Readdir,
    Remove,
    Mkdir,
    Rmdir,
    Realpath,
    Stat,
    Rename,
    Readlink,
    Symlink,
    Extended,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Open => "open",
            Verb::Close => "close",
            Verb::Read => "read",
            Verb::Write => "write",
            Verb::Lstat => "lstat",
            Verb::Fstat => "fstat",
            Verb::Setstat => "setstat",
            Verb::Fsetstat => "fsetstat",
            Verb::Opendir => "opendir",
            Verb::Readdir => "readdir",
            Verb::Remove => "remove",
            Verb::Mkdir => "mkdir",
            Verb::Rmdir => "rmdir",
            Verb::Realpath => "realpath",
            Verb::Stat => "stat",
            Verb::Rename => "rename",
            Verb::Readlink => "readlink",
            Verb::Symlink => "symlink",
            Verb::Extended => "extended",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded SFTP request, as delivered by the transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Open {
        path: String,
        /// Access flags rendered as a mode string ("r", "w", "r+", ...)
        flags: String,
        attrs: FileAttributes,
    },
    Close {
        handle: Vec<u8>,
    },
    Read {
        handle: Vec<u8>,
        offset: u64,
        len: u32,
    },
    Write {
        handle: Vec<u8>,
        offset: u64,
        data: Vec<u8>,
    },
    Lstat {
        path: String,
    },
    Fstat {
        handle: Vec<u8>,
    },
    Setstat {
        path: String,
        attrs: FileAttributes,
    },
    Fsetstat {
        handle: Vec<u8>,
        attrs: FileAttributes,
    },
    Opendir {
        path: String,
    },
    Readdir {
        handle: Vec<u8>,
    },
    Remove {
        path: String,
    },
    Mkdir {
        path: String,
        attrs: FileAttributes,
    },
    Rmdir {
        path: String,
    },
    Realpath {
        path: String,
    },
    Stat {
        path: String,
    },
    Rename {
        path: String,
        target_path: String,
    },
    Readlink {
        path: String,
    },
    Symlink {
        link_path: String,
        target_path: String,
    },
    Extended {
        request: String,
        data: Vec<u8>,
    },
}

impl Operation {
    pub fn verb(&self) -> Verb {
        match self {
            Operation::Open { .. } => Verb::Open,
            Operation::Close { .. } => Verb::Close,
            Operation::Read { .. } => Verb::Read,
            Operation::Write { .. } => Verb::Write,
            Operation::Lstat { .. } => Verb::Lstat,
            Operation::Fstat { .. } => Verb::Fstat,
            Operation::Setstat { .. } => Verb::Setstat,
            Operation::Fsetstat { .. } => Verb::Fsetstat,
            Operation::Opendir { .. } => Verb::Opendir,
            Operation::Readdir { .. } => Verb::Readdir,
            Operation::Remove { .. } => Verb::Remove,
            Operation::Mkdir { .. } => Verb::Mkdir,
            Operation::Rmdir { .. } => Verb::Rmdir,
            Operation::Realpath { .. } => Verb::Realpath,
            Operation::Stat { .. } => Verb::Stat,
            Operation::Rename { .. } => Verb::Rename,
            Operation::Readlink { .. } => Verb::Readlink,
            Operation::Symlink { .. } => Verb::Symlink,
            Operation::Extended { .. } => Verb::Extended,
        }
    }

    /// Every path argument the operation carries
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Operation::Open { path, .. }
            | Operation::Lstat { path }
            | Operation::Setstat { path, .. }
            | Operation::Opendir { path }
            | Operation::Remove { path }
            | Operation::Mkdir { path, .. }
            | Operation::Rmdir { path }
            | Operation::Realpath { path }
            | Operation::Stat { path }
            | Operation::Readlink { path } => vec![path.as_str()],
            Operation::Rename { path, target_path } => vec![path.as_str(), target_path.as_str()],
            Operation::Symlink {
                link_path,
                target_path,
            } => vec![link_path.as_str(), target_path.as_str()],
            Operation::Close { .. }
            | Operation::Read { .. }
            | Operation::Write { .. }
            | Operation::Fstat { .. }
            | Operation::Fsetstat { .. }
            | Operation::Readdir { .. }
            | Operation::Extended { .. } => Vec::new(),
        }
    }
}

/// The single response the dispatcher produces for an operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Status(StatusCode),
    Handle(Vec<u8>),
    Attrs(FileAttributes),
    Name(Vec<NameEntry>),
    Data(Vec<u8>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status(StatusCode::Ok)
    }

    /// Status code when this is a status reply
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Reply::Status(code) => Some(*code),
            _ => None,
        }
    }

    pub fn is_status(&self, code: StatusCode) -> bool {
        self.status() == Some(code)
    }
}

impl From<StatusCode> for Reply {
    fn from(code: StatusCode) -> Self {
        Reply::Status(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_sftp_v3_numbering() {
        assert_eq!(StatusCode::Ok.code(), 0);
        assert_eq!(StatusCode::Eof.code(), 1);
        assert_eq!(StatusCode::NoSuchFile.code(), 2);
        assert_eq!(StatusCode::PermissionDenied.code(), 3);
        assert_eq!(StatusCode::Failure.code(), 4);
        assert_eq!(StatusCode::OpUnsupported.code(), 8);
        assert_eq!(StatusCode::from_code(3), Some(StatusCode::PermissionDenied));
        assert_eq!(StatusCode::from_code(9), None);
    }

    #[test]
    fn handle_bytes_are_four_byte_big_endian() {
        let handle = HandleId::new(0x0102_0304);
        assert_eq!(handle.to_bytes(), vec![1, 2, 3, 4]);
        assert_eq!(HandleId::from_bytes(&[1, 2, 3, 4]), Some(handle));
        assert_eq!(HandleId::from_bytes(&[1, 2, 3]), None);
        assert_eq!(HandleId::from_bytes(b"handle-7"), None);
    }

    #[test]
    fn permission_string_renders_type_and_bits() {
        assert_eq!(permission_string(S_IFDIR | 0o755), "drwxr-xr-x");
        assert_eq!(permission_string(S_IFREG | 0o640), "-rw-r-----");
        assert_eq!(permission_string(S_IFLNK | 0o777), "lrwxrwxrwx");
    }

    #[test]
    fn name_entry_synthesises_longname() {
        let attrs = FileAttributes {
            size: Some(42),
            uid: Some(1000),
            gid: Some(100),
            permissions: Some(S_IFREG | 0o644),
            atime: Some(0),
            mtime: Some(0),
        };
        let entry = NameEntry::new("notes.txt", attrs);
        assert!(entry.longname.starts_with("-rw-r--r--"));
        assert!(entry.longname.contains("1000"));
        assert!(entry.longname.contains("Jan 01 00:00"));
        assert!(entry.longname.ends_with("notes.txt"));
    }

    #[test]
    fn attrs_report_file_type() {
        let dir = FileAttributes {
            permissions: Some(S_IFDIR | 0o700),
            ..Default::default()
        };
        assert!(dir.is_dir());
        assert!(!dir.is_regular_file());
        assert!(!FileAttributes::default().is_dir());
    }

    #[test]
    fn auth_request_debug_hides_password() {
        let request = AuthRequest {
            method: AuthMethod::Password,
            username: "alice".into(),
            password: Some("hunter2".into()),
        };
        let rendered = format!("{:?}", request);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn auth_method_names_match_ssh() {
        assert_eq!(
            "keyboard-interactive".parse::<AuthMethod>(),
            Ok(AuthMethod::KeyboardInteractive)
        );
        assert_eq!(AuthMethod::PublicKey.to_string(), "publickey");
        assert!("kerberos".parse::<AuthMethod>().is_err());
    }

    #[test]
    fn remote_info_reports_family() {
        let v4 = RemoteInfo::new("10.0.0.1:2222".parse().unwrap(), "SSH-2.0-test");
        assert_eq!(v4.family(), AddressFamily::Ipv4);
        let v6 = RemoteInfo::new("[::1]:22".parse().unwrap(), "SSH-2.0-test");
        assert_eq!(v6.family(), AddressFamily::Ipv6);
        assert_eq!(v6.port, 22);
    }
}
