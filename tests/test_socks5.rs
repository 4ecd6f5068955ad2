use anyhow::bail;
use fast_socks5::server::Socks5Server;
use futures::StreamExt;
use socksenv::{ConnectOptions, Environment, NetworkTarget, ProxyKind, Scheme};
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

const SOCKS_SERVER_LISTENER_PORT: u16 = 1034;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Echo every byte back until the peer closes
async fn spawn_echo_server() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                if let Err(err) = tokio::io::copy(&mut reader, &mut writer).await {
                    tracing::error!("echo failed: {:#}", &err);
                }
            });
        }
    });
    Ok(addr)
}

async fn spawn_socks5_server(listen_addr: String) -> anyhow::Result<()> {
    let listener = <Socks5Server>::bind(&listen_addr).await?;
    tracing::info!("Listen for socks connections @ {}", &listen_addr);

    tokio::spawn(async move {
        let mut incoming = listener.incoming();

        // Standard TCP loop
        while let Some(socket_res) = incoming.next().await {
            match socket_res {
                Ok(socket) => {
                    tokio::spawn(async move {
                        if let Err(err) = socket.upgrade_to_socks5().await {
                            tracing::error!("{:#}", &err);
                        }
                    });
                }
                Err(err) => {
                    tracing::error!("accept error = {:?}", err);
                    break;
                }
            }
        }
    });
    Ok(())
}

#[tokio::test]
async fn test_socks5_from_environment() -> anyhow::Result<()> {
    init_tracing();

    let echo_addr = spawn_echo_server().await?;
    spawn_socks5_server(format!("127.0.0.1:{}", SOCKS_SERVER_LISTENER_PORT)).await?;

    let env = Environment::from_pairs([
        ("https_proxy", "http://ignored.example:3128".to_string()),
        (
            "ALL_PROXY",
            format!("socks5://127.0.0.1:{}", SOCKS_SERVER_LISTENER_PORT),
        ),
    ]);
    let Some(proxy) = socksenv::resolve_proxy_in(Scheme::Secure, &env) else {
        bail!("ALL_PROXY was not picked up");
    };
    assert_eq!(proxy.kind, ProxyKind::Socks5);
    assert_eq!(proxy.port, SOCKS_SERVER_LISTENER_PORT);

    let options = ConnectOptions {
        timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    };
    // the echo server does not speak TLS, so tunnel a plain stream
    let mut connection = proxy
        .connect(NetworkTarget::new("127.0.0.1", echo_addr.port()), Scheme::Plain, &options)
        .await?;
    tracing::info!(event = "client.initialized_socks");
    assert!(connection.is_proxied());

    let verification_slice: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
    connection.write_all(verification_slice).await?;

    let mut recv_buffer: Vec<u8> = vec![0; verification_slice.len()];
    connection.read_exact(recv_buffer.as_mut_slice()).await?;

    if recv_buffer.as_slice() == verification_slice {
        tracing::info!(event = "client.slice.ok");
    } else {
        tracing::error!(event = "client.unexpected_data", action = "read");
        bail!("echo mismatch");
    }

    connection.close().await?;
    Ok(())
}
