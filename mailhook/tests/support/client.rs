//! A minimal line-oriented SMTP client

use std::net::SocketAddr;

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

pub struct SmtpClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    greeting: String,
}

impl SmtpClient {
    /// Connect and wait for the greeting
    ///
    /// # Errors
    ///
    /// If the connection fails or is closed before the greeting.
    pub async fn connect(address: SocketAddr) -> anyhow::Result<Self> {
        let (reader, writer) = TcpStream::connect(address).await?.into_split();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
            greeting: String::new(),
        };
        client.greeting = client.reply().await?;

        Ok(client)
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Send one command line and return the reply, without its line terminator
    ///
    /// # Errors
    ///
    /// If the connection breaks.
    pub async fn command(&mut self, line: &str) -> anyhow::Result<String> {
        self.writer.write_all(format!("{line}\r\n").as_bytes()).await?;
        self.reply().await
    }

    /// Send a body (already CRLF terminated) followed by the end-of-data marker
    ///
    /// # Errors
    ///
    /// If the connection breaks.
    pub async fn data(&mut self, body: &str) -> anyhow::Result<String> {
        self.writer.write_all(body.as_bytes()).await?;
        self.writer.write_all(b".\r\n").await?;
        self.reply().await
    }

    /// The next reply line
    ///
    /// # Errors
    ///
    /// If the connection breaks or is closed.
    pub async fn reply(&mut self) -> anyhow::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            anyhow::bail!("Connection closed by server");
        }

        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// A complete transaction on a fresh connection, returning every reply in order
    ///
    /// # Errors
    ///
    /// If the connection breaks at any point.
    pub async fn send_mail(
        address: SocketAddr,
        from: &str,
        to: &str,
        body: &str,
    ) -> anyhow::Result<Vec<String>> {
        let mut client = Self::connect(address).await?;
        let mut replies = vec![client.greeting().to_string()];

        replies.push(client.command("EHLO e2e.test").await?);
        replies.push(client.command(&format!("MAIL FROM:<{from}>")).await?);
        replies.push(client.command(&format!("RCPT TO:<{to}>")).await?);
        replies.push(client.command("DATA").await?);
        replies.push(client.data(body).await?);
        replies.push(client.command("QUIT").await?);

        Ok(replies)
    }
}
