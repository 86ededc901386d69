//! Named duplex channel transport.
//!
//! On unix the channel is a unix-domain socket whose path is derived from the
//! [`PipeName`]; on Windows it is a named pipe at `\\.\pipe\<name>`. Either
//! way a listener hands out exactly one connection and is consumed by
//! [`PipeListener::accept`].

use crate::config::{PipeConfig, PipeName};
use crate::{PipeCalcError, Result};
use tracing::debug;

#[cfg(unix)]
pub use self::unix::{connect, ClientStream, PipeListener, ServerStream};
#[cfg(windows)]
pub use self::windows::{connect, ClientStream, PipeListener, ServerStream};

fn connect_failed(name: &PipeName, reason: impl std::fmt::Display) -> PipeCalcError {
    PipeCalcError::ConnectFailed {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(unix)]
mod unix {
    use super::*;
    use fs2::FileExt;
    use std::fs::{File, OpenOptions};
    use std::os::unix::fs::{FileTypeExt, MetadataExt};
    use std::path::{Path, PathBuf};
    use tokio::net::{UnixListener, UnixStream};

    pub type ServerStream = UnixStream;
    pub type ClientStream = UnixStream;

    /// Listening side of the channel.
    ///
    /// Holds an exclusive lock on `<socket>.lock` for its lifetime. On drop
    /// the socket file is removed only if it is still the one this listener
    /// created.
    #[derive(Debug)]
    pub struct PipeListener {
        listener: UnixListener,
        path: PathBuf,
        /// Device and inode of the socket file created by `bind`.
        identity: (u64, u64),
        lock_path: PathBuf,
        _lock: File,
    }

    fn file_identity(meta: &std::fs::Metadata) -> (u64, u64) {
        (meta.dev(), meta.ino())
    }

    fn lock_path_for(path: &Path) -> PathBuf {
        let mut raw = path.as_os_str().to_owned();
        raw.push(PipeConfig::LOCK_FILE_SUFFIX);
        PathBuf::from(raw)
    }

    fn address_in_use(path: &Path) -> PipeCalcError {
        std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            format!("{} is owned by a running server", path.display()),
        )
        .into()
    }

    /// Take the lock that guards `path` against a second server.
    fn acquire_lock(lock_path: &Path, path: &Path) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(address_in_use(path));
        }

        // The previous owner may have unlinked the lock file between our
        // open and our lock; then the lock we hold guards nothing.
        match std::fs::metadata(lock_path) {
            Ok(on_disk) if file_identity(&on_disk) == file_identity(&file.metadata()?) => Ok(file),
            Ok(_) => Err(address_in_use(path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(address_in_use(path)),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a leftover socket at `path`.
    ///
    /// Anything that is not a socket, or a socket that still accepts
    /// connections, is left in place and reported as an error.
    fn clear_stale_socket(path: &Path) -> Result<()> {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if !meta.file_type().is_socket() {
            return Err(PipeCalcError::Config {
                message: format!("{} exists and is not a socket", path.display()),
            });
        }
        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            return Err(address_in_use(path));
        }

        debug!("Removing stale socket file {}", path.display());
        std::fs::remove_file(path)?;
        Ok(())
    }

    impl PipeListener {
        /// Bind the socket for `name`.
        ///
        /// Fails with `AddrInUse` if another server owns the name, and with
        /// `Config` if the path holds something other than a socket.
        pub fn bind(name: &PipeName) -> Result<Self> {
            let path = name.socket_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let lock_path = lock_path_for(&path);
            let lock = acquire_lock(&lock_path, &path)?;

            let bound = clear_stale_socket(&path)
                .and_then(|_| Ok(UnixListener::bind(&path)?))
                .and_then(|listener| {
                    let identity = file_identity(&std::fs::symlink_metadata(&path)?);
                    Ok((listener, identity))
                });
            let (listener, identity) = match bound {
                Ok(bound) => bound,
                Err(e) => {
                    let _ = std::fs::remove_file(&lock_path);
                    return Err(e);
                }
            };
            debug!("Listening on {}", path.display());

            Ok(Self {
                listener,
                path,
                identity,
                lock_path,
                _lock: lock,
            })
        }

        /// Wait for the single client connection.
        pub async fn accept(self) -> Result<ServerStream> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(stream)
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for PipeListener {
        fn drop(&mut self) {
            match std::fs::symlink_metadata(&self.path) {
                Ok(meta) if file_identity(&meta) == self.identity => {
                    if let Err(e) = std::fs::remove_file(&self.path) {
                        debug!("Failed to remove socket file {}: {}", self.path.display(), e);
                    }
                }
                Ok(_) => debug!("Socket path {} was replaced, leaving it", self.path.display()),
                Err(_) => {}
            }
            // Removed while the lock is still held; the lock itself is
            // released when `_lock` drops.
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }

    /// Connect to the listener for `name`.
    pub async fn connect(name: &PipeName) -> Result<ClientStream> {
        let path = name.socket_path();
        tokio::time::timeout(PipeConfig::CONNECT_TIMEOUT, UnixStream::connect(&path))
            .await
            .map_err(|_| connect_failed(name, "timed out"))?
            .map_err(|e| connect_failed(name, e))
    }
}

#[cfg(windows)]
mod windows {
    use super::*;
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };
    use windows_sys::Win32::Foundation::ERROR_PIPE_BUSY;

    pub type ServerStream = NamedPipeServer;
    pub type ClientStream = NamedPipeClient;

    /// Listening side of the channel: the first and only pipe instance.
    #[derive(Debug)]
    pub struct PipeListener {
        server: NamedPipeServer,
    }

    impl PipeListener {
        pub fn bind(name: &PipeName) -> Result<Self> {
            let path = name.pipe_path();
            let server = ServerOptions::new()
                .first_pipe_instance(true)
                .create(&path)?;
            debug!("Listening on {}", path);
            Ok(Self { server })
        }

        /// Wait for the single client connection.
        pub async fn accept(self) -> Result<ServerStream> {
            self.server.connect().await?;
            Ok(self.server)
        }
    }

    /// Connect to the pipe for `name`, retrying while the instance is busy.
    pub async fn connect(name: &PipeName) -> Result<ClientStream> {
        let path = name.pipe_path();
        let open = async {
            loop {
                match ClientOptions::new().open(&path) {
                    Ok(client) => return Ok(client),
                    Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) => {}
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(PipeConfig::CONNECT_RETRY_INTERVAL).await;
            }
        };

        tokio::time::timeout(PipeConfig::CONNECT_TIMEOUT, open)
            .await
            .map_err(|_| connect_failed(name, "timed out"))?
            .map_err(|e| connect_failed(name, e))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn temp_name(dir: &TempDir, file: &str) -> PipeName {
        PipeName::new(dir.path().join(file).to_string_lossy().into_owned()).unwrap()
    }

    #[tokio::test]
    async fn test_bind_accept_connect() {
        let dir = TempDir::new().unwrap();
        let name = temp_name(&dir, "calc.sock");

        let listener = PipeListener::bind(&name).unwrap();
        let accept = tokio::spawn(listener.accept());

        let mut client = connect(&name).await.unwrap();
        let mut server = accept.await.unwrap().unwrap();

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_connect_without_listener_fails() {
        let dir = TempDir::new().unwrap();
        let name = temp_name(&dir, "nobody.sock");

        match connect(&name).await {
            Err(PipeCalcError::ConnectFailed { name: n, .. }) => {
                assert!(n.ends_with("nobody.sock"));
            }
            other => panic!("Expected ConnectFailed, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_regular_file_is_never_replaced() {
        let dir = TempDir::new().unwrap();
        let name = temp_name(&dir, "notes.txt");
        std::fs::write(name.socket_path(), b"important user data").unwrap();

        match PipeListener::bind(&name) {
            Err(PipeCalcError::Config { message }) => assert!(message.contains("not a socket")),
            other => panic!("Expected Config error, got: {:?}", other),
        }

        let kept = std::fs::read(name.socket_path()).unwrap();
        assert_eq!(kept, b"important user data");
    }

    #[tokio::test]
    async fn test_live_server_is_not_taken_over() {
        let dir = TempDir::new().unwrap();
        let name = temp_name(&dir, "live.sock");

        let first = PipeListener::bind(&name).unwrap();
        match PipeListener::bind(&name) {
            Err(PipeCalcError::Io {
                source: Some(source),
                ..
            }) => assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse),
            other => panic!("Expected AddrInUse, got: {:?}", other),
        }

        // The first listener still owns a reachable socket.
        let accept = tokio::spawn(first.accept());
        connect(&name).await.unwrap();
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_live_foreign_socket_is_not_replaced() {
        let dir = TempDir::new().unwrap();
        let name = temp_name(&dir, "foreign.sock");
        let _foreign = std::os::unix::net::UnixListener::bind(name.socket_path()).unwrap();

        let result = PipeListener::bind(&name);
        assert!(result.is_err());
        assert!(name.socket_path().exists());
    }

    #[tokio::test]
    async fn test_dead_socket_is_replaced() {
        let dir = TempDir::new().unwrap();
        let name = temp_name(&dir, "dead.sock");

        // A std listener leaves its socket file behind when dropped.
        drop(std::os::unix::net::UnixListener::bind(name.socket_path()).unwrap());
        assert!(name.socket_path().exists());

        let listener = PipeListener::bind(&name).unwrap();
        let accept = tokio::spawn(listener.accept());
        connect(&name).await.unwrap();
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_drop_leaves_replaced_socket_alone() {
        let dir = TempDir::new().unwrap();
        let name = temp_name(&dir, "replaced.sock");

        let listener = PipeListener::bind(&name).unwrap();
        std::fs::remove_file(name.socket_path()).unwrap();
        let _other = std::os::unix::net::UnixListener::bind(name.socket_path()).unwrap();

        drop(listener);
        assert!(name.socket_path().exists());
    }

    #[tokio::test]
    async fn test_socket_file_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let name = temp_name(&dir, "drop.sock");

        let listener = PipeListener::bind(&name).unwrap();
        assert!(listener.path().exists());
        drop(listener);
        assert!(!name.socket_path().exists());
        assert!(!dir.path().join("drop.sock.lock").exists());
    }
}
