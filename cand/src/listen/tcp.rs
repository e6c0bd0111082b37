use std::net::SocketAddr;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task;
use tokio_util::codec::{FramedRead, FramedWrite};

use cand::can_proto::{msg_len, CanMsg, CanRecordCodec, MAX_DATA_LENGTH};
use cand::util;
use cand::{CanDevice, CanFile, OpenOptions};

const READ_BUFFER_SIZE: usize = 16 * msg_len(MAX_DATA_LENGTH);

pub async fn listen(addr: SocketAddr, device: CanDevice) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("{}: listening on {}", device.name(), addr);

    loop {
        let (conn, addr) = listener.accept().await?;
        log::debug!("New connection from {}", addr);

        task::spawn(util::catch_error("Client", handle_client(conn, device.clone())));
    }
}

async fn handle_client(conn: TcpStream, device: CanDevice) -> anyhow::Result<()> {
    let file = device
        .open(&OpenOptions::new().read(true).write(true))
        .await?;
    let (read, write) = conn.into_split();

    let res = tokio::select! {
        res = read_from_client(FramedRead::new(read, CanRecordCodec), &file) => res,
        res = write_to_client(&file, FramedWrite::new(write, CanRecordCodec)) => res,
    };

    file.close().await;
    res
}

async fn read_from_client(
    mut records: FramedRead<OwnedReadHalf, CanRecordCodec>,
    file: &CanFile,
) -> anyhow::Result<()> {
    let mut buf = BytesMut::new();
    while let Some(msg) = records.next().await {
        let msg = msg?;
        buf.clear();
        msg.encode(&mut buf);
        file.write(&buf).await?;
    }
    Ok(())
}

async fn write_to_client(
    file: &CanFile,
    mut sink: FramedWrite<OwnedWriteHalf, CanRecordCodec>,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let nread = file.read(&mut buf).await?;
        if nread == 0 {
            return Ok(());
        }

        let mut records = &buf[..nread];
        while let Some(msg) = CanMsg::decode(records)? {
            records = &records[msg.wire_len()..];
            sink.feed(msg).await?;
        }
        sink.flush().await?;
    }
}
