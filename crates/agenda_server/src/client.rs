//! Request/response client for the command port.

use crate::error::{ServerError, ServerResult};
use agenda_protocol::{
    read_message, write_message, Response, Snapshot, SyncMessage, DEFAULT_MAX_FRAME_LEN,
};
use tokio::net::{TcpStream, ToSocketAddrs};

/// A connection to a node's command server.
///
/// Requests are sent one at a time; each waits for its response.
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
    max_frame_len: usize,
}

impl Client {
    /// Connects to a node's client address.
    pub async fn connect(addr: impl ToSocketAddrs) -> ServerResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        })
    }

    /// Sets the frame size ceiling.
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Sends `message` and waits for the reply.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or if the server closes the connection
    /// without answering. A rejected request is not an error here: it
    /// comes back as [`Response::Error`].
    pub async fn request(&mut self, message: &SyncMessage) -> ServerResult<Response> {
        write_message(&mut self.stream, message, self.max_frame_len).await?;
        read_message(&mut self.stream, self.max_frame_len)
            .await?
            .ok_or_else(|| ServerError::UnexpectedResponse("connection closed before reply".into()))
    }

    /// Adds a contact.
    pub async fn add(&mut self, name: &str, phone: &str) -> ServerResult<Response> {
        self.request(&SyncMessage::add(name, phone)).await
    }

    /// Removes a contact.
    pub async fn remove(&mut self, name: &str) -> ServerResult<Response> {
        self.request(&SyncMessage::remove(name)).await
    }

    /// Updates a contact's phone.
    pub async fn update(&mut self, name: &str, phone: &str) -> ServerResult<Response> {
        self.request(&SyncMessage::update(name, phone)).await
    }

    /// Fetches the whole directory. An empty directory is an empty map.
    pub async fn view(&mut self) -> ServerResult<Snapshot> {
        match self.request(&SyncMessage::view()).await? {
            Response::Directory(snapshot) => Ok(snapshot),
            Response::Empty => Ok(Snapshot::new()),
            other => Err(ServerError::UnexpectedResponse(other.to_string())),
        }
    }
}
