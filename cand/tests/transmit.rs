mod common;

use std::sync::Arc;
use std::time::Duration;

use cand::can_proto::{CanIoctl, CanMsg};
use cand::loopback::LoopbackOptions;
use cand::{DeviceConfig, Error, Ioctl, TxMode};

use common::*;

#[tokio::test]
async fn written_messages_come_back_in_order() {
    let rig = default_rig();
    let file = rig.device.open(&rw()).await.unwrap();

    let msgs = [
        msg(0x100, &[1]),
        msg(0x101, &[2, 3]),
        CanMsg::new(0x1234_5678, true, &[0; 20]).unwrap(),
    ];
    let buf = encode(&msgs);
    assert_eq!(file.write(&buf).await, Ok(buf.len()));

    assert_eq!(rig.bus.complete_all(&rig.upper), 3);
    assert_eq!(rig.bus.sent(), msgs.to_vec());

    let mut rbuf = read_buffer();
    let nread = file.read(&mut rbuf).await.unwrap();
    assert_eq!(decode_all(&rbuf[..nread]), msgs.to_vec());

    file.close().await;
}

#[tokio::test]
async fn trailing_partial_record_is_ignored() {
    let rig = default_rig();
    let file = rig.device.open(&write_only()).await.unwrap();

    let mut buf = encode(&[msg(1, &[1, 2, 3, 4])]);
    let whole = buf.len();
    buf.extend_from_slice(&encode(&[msg(2, &[5, 6, 7, 8])])[..10]);

    assert_eq!(file.write(&buf).await, Ok(whole));
    assert_eq!(file.write(&buf[..5]).await, Ok(0));
    assert_eq!(rig.bus.sent().len(), 1);
}

#[tokio::test]
async fn invalid_dlc_is_rejected_up_front() {
    let rig = default_rig();
    let file = rig.device.open(&write_only()).await.unwrap();

    let mut bad = encode(&[msg(1, &[])]);
    bad[4] = 16;
    assert_eq!(file.write(&bad).await, Err(Error::InvalidArgument));

    let mut buf = encode(&[msg(2, &[9])]);
    let good = buf.len();
    buf.extend_from_slice(&bad);
    assert_eq!(file.write(&buf).await, Ok(good));
}

#[tokio::test]
async fn nonblocking_write_fails_once_the_queue_is_full() {
    let config = DeviceConfig {
        tx_fifo_size: 4,
        ..DeviceConfig::default()
    };
    let rig = rig(config, LoopbackOptions::default());
    let file = rig
        .device
        .open(&write_only().nonblocking(true))
        .await
        .unwrap();

    let one = encode(&[msg(7, &[7])]);
    for _ in 0..4 {
        assert_eq!(file.write(&one).await, Ok(one.len()));
    }
    assert_eq!(file.write(&one).await, Err(Error::WouldBlock));

    // One in the controller, three waiting.
    assert_eq!(file.pending_write().await, Ok(3));

    rig.bus.complete(&rig.upper);
    let two = encode(&[msg(8, &[8]), msg(9, &[9])]);
    assert_eq!(file.write(&two).await, Ok(one.len()));
}

#[tokio::test(start_paused = true)]
async fn blocked_writer_resumes_after_a_completion() {
    let config = DeviceConfig {
        tx_fifo_size: 2,
        ..DeviceConfig::default()
    };
    let rig = rig(config, LoopbackOptions::default());
    let file = Arc::new(rig.device.open(&write_only()).await.unwrap());

    let two = encode(&[msg(1, &[]), msg(2, &[])]);
    assert_eq!(file.write(&two).await, Ok(two.len()));

    let writer = file.clone();
    let mut blocked = tokio::spawn(async move {
        let third = encode(&[msg(3, &[])]);
        writer.write(&third).await
    });

    assert!(tokio::time::timeout(Duration::from_millis(100), &mut blocked)
        .await
        .is_err());

    assert!(rig.bus.complete(&rig.upper));
    assert_eq!(blocked.await.unwrap(), Ok(8));

    rig.bus.complete_all(&rig.upper);
    let ids: Vec<u32> = rig.bus.sent().iter().map(|msg| msg.header.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn rejected_send_is_retried_in_order() {
    let rig = default_rig();
    let file = rig.device.open(&write_only()).await.unwrap();

    rig.bus.reject_next(1);
    let first = encode(&[msg(0x10, &[1])]);
    assert_eq!(file.write(&first).await, Ok(first.len()));
    assert!(rig.bus.sent().is_empty());
    assert_eq!(file.pending_write().await, Ok(1));

    let second = encode(&[msg(0x11, &[2])]);
    assert_eq!(file.write(&second).await, Ok(second.len()));
    rig.bus.complete_all(&rig.upper);

    let ids: Vec<u32> = rig.bus.sent().iter().map(|msg| msg.header.id).collect();
    assert_eq!(ids, vec![0x10, 0x11]);
}

#[tokio::test]
async fn output_flush_discards_queued_messages() {
    let rig = default_rig();
    let file = rig.device.open(&write_only()).await.unwrap();

    let buf = encode(&[msg(1, &[]), msg(2, &[]), msg(3, &[])]);
    file.write(&buf).await.unwrap();
    assert_eq!(file.pending_write().await, Ok(2));

    assert_eq!(file.ioctl(Ioctl::OutputFlush).await, Ok(0));
    assert_eq!(file.pending_write().await, Ok(0));
    assert_eq!(rig.bus.in_flight(), 0);
    assert_eq!(rig.bus.ioctls(), vec![(CanIoctl::OFlush.code(), 0)]);

    // Nothing left to complete, so close returns right away.
    file.close().await;
    assert_eq!(rig.bus.shutdowns(), 1);
}

#[tokio::test]
async fn hardware_queue_completes_on_acceptance() {
    let config = DeviceConfig {
        tx_fifo_size: 4,
        tx_mode: TxMode::HardwareQueue,
        ..DeviceConfig::default()
    };
    let options = LoopbackOptions {
        hw_queue_depth: 2,
        ..LoopbackOptions::default()
    };
    let rig = rig(config, options);
    let file = rig.device.open(&write_only()).await.unwrap();

    let buf = encode(&[msg(1, &[]), msg(2, &[]), msg(3, &[])]);
    assert_eq!(file.write(&buf).await, Ok(buf.len()));
    assert_eq!(rig.bus.in_flight(), 2);
    assert_eq!(file.pending_write().await, Ok(1));

    // One deferred kick at a time.
    assert_eq!(rig.upper.txready(), Ok(()));
    assert_eq!(rig.upper.txready(), Err(Error::Busy));
    settle().await;

    // Room in the controller: the worker picks up the last message.
    assert!(rig.bus.complete(&rig.upper));
    settle().await;
    assert_eq!(rig.bus.sent().len(), 3);
    assert_eq!(file.pending_write().await, Ok(0));

    rig.bus.complete_all(&rig.upper);
    settle().await;
    assert_eq!(rig.upper.txready(), Err(Error::NoEntry));
}

#[tokio::test]
async fn txready_needs_hardware_queue_mode() {
    let rig = default_rig();
    let file = rig.device.open(&write_only()).await.unwrap();
    file.write(&encode(&[msg(1, &[])])).await.unwrap();
    assert_eq!(rig.upper.txready(), Err(Error::NotSupported));
}

#[test]
fn hardware_queue_mode_needs_a_runtime() {
    let config = DeviceConfig {
        tx_mode: TxMode::HardwareQueue,
        ..DeviceConfig::default()
    };
    let (lower, _bus) =
        cand::loopback::Loopback::new(&LoopbackOptions::default(), TxMode::HardwareQueue);
    assert!(matches!(
        cand::CanDevice::register(lower, config),
        Err(Error::NoRuntime)
    ));
}

#[tokio::test]
async fn direct_mode_turns_tx_interrupts_off_when_idle() {
    let rig = default_rig();
    let file = rig.device.open(&write_only()).await.unwrap();
    assert!(!rig.bus.txint_enabled());

    file.write(&encode(&[msg(1, &[]), msg(2, &[])])).await.unwrap();
    assert!(rig.bus.txint_enabled());

    rig.bus.complete(&rig.upper);
    assert!(rig.bus.txint_enabled());

    rig.bus.complete(&rig.upper);
    assert!(!rig.bus.txint_enabled());
}

#[tokio::test]
async fn hardware_queue_keeps_tx_interrupts_until_the_controller_drains() {
    let config = DeviceConfig {
        tx_mode: TxMode::HardwareQueue,
        ..DeviceConfig::default()
    };
    let options = LoopbackOptions {
        hw_queue_depth: 2,
        ..LoopbackOptions::default()
    };
    let rig = rig(config, options);
    let file = rig.device.open(&write_only()).await.unwrap();

    file.write(&encode(&[msg(1, &[]), msg(2, &[])])).await.unwrap();
    assert_eq!(file.pending_write().await, Ok(0));
    assert!(rig.bus.txint_enabled());

    // The sender is empty but the controller still holds a frame.
    rig.bus.complete(&rig.upper);
    assert!(rig.bus.txint_enabled());

    rig.bus.complete(&rig.upper);
    assert!(!rig.bus.txint_enabled());
}

#[tokio::test(start_paused = true)]
async fn hardware_queue_worker_wakes_blocked_writer() {
    let config = DeviceConfig {
        tx_fifo_size: 1,
        tx_mode: TxMode::HardwareQueue,
        ..DeviceConfig::default()
    };
    let rig = rig(config, LoopbackOptions::default());
    let file = Arc::new(rig.device.open(&write_only()).await.unwrap());

    // One frame in the controller, one waiting in the sender.
    let one = encode(&[msg(1, &[])]);
    assert_eq!(file.write(&one).await, Ok(8));
    let two = encode(&[msg(2, &[])]);
    assert_eq!(file.write(&two).await, Ok(8));
    assert_eq!(rig.bus.in_flight(), 1);

    let writer = file.clone();
    let mut blocked = tokio::spawn(async move {
        let three = encode(&[msg(3, &[])]);
        writer.write(&three).await
    });
    assert!(tokio::time::timeout(Duration::from_millis(100), &mut blocked)
        .await
        .is_err());

    // Room in the controller: the worker sends the second frame, which
    // frees the sender slot the writer waits for.
    assert!(rig.bus.complete(&rig.upper));
    assert_eq!(blocked.await.unwrap(), Ok(8));

    assert!(rig.bus.complete(&rig.upper));
    settle().await;
    let ids: Vec<u32> = rig.bus.sent().iter().map(|msg| msg.header.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn txdone_without_a_message_in_flight() {
    let rig = default_rig();
    let file = rig.device.open(&write_only()).await.unwrap();
    assert_eq!(rig.upper.txdone(), Err(Error::NoEntry));

    // Queued, but the controller refused it.
    rig.bus.reject_next(1);
    file.write(&encode(&[msg(1, &[])])).await.unwrap();
    assert_eq!(file.pending_write().await, Ok(1));
    assert_eq!(rig.upper.txdone(), Err(Error::NoEntry));
    assert_eq!(file.pending_write().await, Ok(1));
}
