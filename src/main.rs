use anyhow::Context;
use clap::{crate_version, App, Arg};
use http2_server::{
    serve, Accept, Frame, ServerConfig, ServerStream, SettingsFlags, CONNECTION_PREFACE,
};
use log::{error, info};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = App::new("http2-server")
        .version(crate_version!())
        .arg(Arg::with_name("addr").index(1))
        .get_matches();
    let addr = matches.value_of("addr").unwrap_or("127.0.0.1:8080");

    let listener = TcpListener::bind(addr).await.context("bind")?;
    info!("listening on {} (h2c, prior knowledge)", addr);
    loop {
        let (socket, peer) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(err) = handle(socket).await {
                error!("{}: {:#}", peer, err);
            }
        });
    }
}

async fn handle(mut socket: TcpStream) -> anyhow::Result<()> {
    // the engine takes over after the preface; this is the collaborator
    // that consumes the client magic and sends our SETTINGS
    let mut magic = [0u8; 24];
    socket.read_exact(&mut magic).await.context("read preface")?;
    anyhow::ensure!(magic == CONNECTION_PREFACE[..], "bad connection preface");
    Frame::Settings {
        flags: SettingsFlags::empty(),
        params: Vec::new(),
    }
    .write_into(&mut socket)
    .await
    .context("send settings")?;

    let listener = |stream: ServerStream| {
        tokio::spawn(echo(stream));
        Accept::Accept
    };
    serve(socket, listener, ServerConfig::default()).await?;
    Ok(())
}

async fn echo(mut stream: ServerStream) {
    if let Err(err) = respond(&mut stream).await {
        error!("stream {}: {:#}", stream.id(), err);
        stream.cancel();
    }
}

async fn respond(stream: &mut ServerStream) -> anyhow::Result<()> {
    let request = stream.read_headers().await?;
    info!(
        "stream {}: {:?}",
        stream.id(),
        request
            .fields
            .iter()
            .find(|(name, _)| name == ":path")
            .map_or("-", |(_, path)| path)
    );
    let body = stream.read_all().await?;
    stream
        .write_headers(
            vec![
                (":status".to_owned(), "200".to_owned()),
                ("content-type".to_owned(), "application/octet-stream".to_owned()),
            ],
            false,
        )
        .await?;
    let body = if body.is_empty() {
        http2_server::Bytes::from_static(b"hello from http2-server\n")
    } else {
        body
    };
    stream.write(body, true).await?;
    Ok(())
}
