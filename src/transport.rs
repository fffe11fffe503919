use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connect(String),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ssh protocol error: {0}")]
    Ssh(String),
}

/// The captured result of a remote command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// The seam between the transfer engine and a concrete remote endpoint. All
/// remote operations (mkdir, inventory, sentinel touch/rm, file upload) are
/// expressed purely in terms of this trait so the engine can be exercised
/// against a fake in-memory endpoint in tests.
pub trait Transport {
    fn run(&self, command: &str) -> Result<CommandOutput, TransportError>;
    fn put(&self, local: &Path, remote: &str) -> Result<(), TransportError>;
}

/// SSH-backed production transport. Authenticates with either a password or
/// a private key, executes commands over an exec channel, and uploads files
/// via SCP.
pub struct SshTransport {
    session: ssh2::Session,
}

pub struct SshCredentials<'a> {
    pub host: &'a str,
    pub port: u16,
    pub username: &'a str,
    pub password: Option<&'a str>,
    pub identity_file: Option<&'a Path>,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

impl SshTransport {
    pub fn connect(creds: SshCredentials) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", creds.host, creds.port);
        let tcp = TcpStream::connect(&addr).map_err(|e| TransportError::Connect(e.to_string()))?;
        tcp.set_read_timeout(Some(CONNECT_TIMEOUT))
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let mut session = ssh2::Session::new().map_err(|e| TransportError::Ssh(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| TransportError::Ssh(e.to_string()))?;

        match (creds.password, creds.identity_file) {
            (_, Some(key_path)) => {
                session
                    .userauth_pubkey_file(creds.username, None, key_path, None)
                    .map_err(|e| TransportError::Auth(e.to_string()))?;
            }
            (Some(password), None) => {
                session
                    .userauth_password(creds.username, password)
                    .map_err(|e| TransportError::Auth(e.to_string()))?;
            }
            (None, None) => {
                return Err(TransportError::Auth(
                    "no credentials supplied: need a password or an identity file".to_string(),
                ));
            }
        }

        if !session.authenticated() {
            return Err(TransportError::Auth("authentication did not succeed".to_string()));
        }

        Ok(SshTransport { session })
    }
}

impl Transport for SshTransport {
    fn run(&self, command: &str) -> Result<CommandOutput, TransportError> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| TransportError::Ssh(e.to_string()))?;
        channel.exec(command).map_err(|e| TransportError::Ssh(e.to_string()))?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr)?;

        channel.wait_close().map_err(|e| TransportError::Ssh(e.to_string()))?;
        let exit_code = channel.exit_status().map_err(|e| TransportError::Ssh(e.to_string()))?;

        Ok(CommandOutput { stdout, stderr, exit_code })
    }

    fn put(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let metadata = std::fs::metadata(local)?;
        let mut local_file = std::fs::File::open(local)?;

        let mut remote_file = self
            .session
            .scp_send(Path::new(remote), 0o644, metadata.len(), None)
            .map_err(|e| TransportError::Ssh(e.to_string()))?;

        std::io::copy(&mut local_file, &mut remote_file)?;
        remote_file.send_eof().map_err(|e| TransportError::Ssh(e.to_string()))?;
        remote_file.wait_eof().map_err(|e| TransportError::Ssh(e.to_string()))?;
        remote_file.close().map_err(|e| TransportError::Ssh(e.to_string()))?;
        remote_file.wait_close().map_err(|e| TransportError::Ssh(e.to_string()))?;

        Ok(())
    }
}
