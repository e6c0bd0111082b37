mod common;

use cand::can_proto::CanIoctl;
use cand::loopback::LoopbackOptions;
use cand::{DeviceConfig, Error, Ioctl, MAX_OPENS};

use common::*;

#[tokio::test]
async fn first_open_brings_the_controller_up() {
    let rig = default_rig();
    assert_eq!(rig.bus.resets(), 1);
    assert!(!rig.bus.is_enabled());

    let first = rig.device.open(&read_only()).await.unwrap();
    let second = rig.device.open(&write_only()).await.unwrap();
    assert_eq!(rig.bus.setups(), 1);
    assert!(rig.bus.rxint_enabled());

    first.close().await;
    assert!(rig.bus.is_enabled());
    second.close().await;
    assert!(!rig.bus.is_enabled());
    assert!(!rig.bus.rxint_enabled());
    assert_eq!(rig.bus.shutdowns(), 1);
}

#[tokio::test]
async fn failed_setup_is_reported() {
    let rig = default_rig();
    rig.bus.fail_next_setup(Error::Io);
    assert!(matches!(
        rig.device.open(&read_only()).await,
        Err(Error::Io)
    ));

    let file = rig.device.open(&read_only()).await.unwrap();
    assert_eq!(rig.bus.setups(), 1);
    file.close().await;
}

#[tokio::test]
async fn too_many_open_files() {
    let rig = default_rig();
    let mut files = Vec::new();
    for _ in 0..MAX_OPENS {
        files.push(rig.device.open(&write_only()).await.unwrap());
    }
    assert!(matches!(
        rig.device.open(&write_only()).await,
        Err(Error::TooManyOpenFiles)
    ));

    files.pop().unwrap().close().await;
    files.push(rig.device.open(&write_only()).await.unwrap());

    for file in files {
        file.close().await;
    }
    assert_eq!(rig.bus.shutdowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn last_close_waits_for_the_queue_to_drain() {
    let rig = default_rig();
    let file = rig.device.open(&write_only()).await.unwrap();

    let buf = encode(&[msg(1, &[]), msg(2, &[]), msg(3, &[])]);
    file.write(&buf).await.unwrap();

    let mut closing = tokio::spawn(file.close());
    assert!(
        tokio::time::timeout(std::time::Duration::from_secs(2), &mut closing)
            .await
            .is_err()
    );
    assert_eq!(rig.bus.shutdowns(), 0);
    assert!(rig.bus.is_enabled());

    assert_eq!(rig.bus.complete_all(&rig.upper), 3);
    closing.await.unwrap();
    assert_eq!(rig.bus.shutdowns(), 1);
    assert_eq!(rig.bus.sent().len(), 3);
}

#[tokio::test]
async fn dropped_file_is_released_in_the_background() {
    let rig = default_rig();
    let file = rig.device.open(&read_only()).await.unwrap();
    drop(file);
    settle().await;

    assert_eq!(rig.bus.shutdowns(), 1);
}

#[tokio::test]
async fn reopening_starts_with_an_empty_queue() {
    let rig = default_rig();
    let file = rig.device.open(&write_only().nonblocking(true)).await.unwrap();
    file.write(&encode(&[msg(1, &[])])).await.unwrap();
    rig.bus.complete_all(&rig.upper);
    file.close().await;

    let file = rig.device.open(&write_only()).await.unwrap();
    assert_eq!(file.pending_write().await, Ok(0));
    assert_eq!(rig.bus.setups(), 2);
}

#[tokio::test]
async fn transceiver_state_needs_a_transceiver() {
    let rig = default_rig();
    let file = rig.device.open(&rw()).await.unwrap();
    assert_eq!(
        file.ioctl(Ioctl::GetTransceiverState).await,
        Err(Error::NotTty)
    );
    assert_eq!(
        file.ioctl(Ioctl::SetTransceiverState(1)).await,
        Err(Error::NotTty)
    );
}

#[tokio::test]
async fn transceiver_state_is_delegated() {
    let options = LoopbackOptions {
        transceiver: Some(1),
        ..LoopbackOptions::default()
    };
    let rig = rig(DeviceConfig::default(), options);
    let file = rig.device.open(&rw()).await.unwrap();

    assert_eq!(file.ioctl(Ioctl::GetTransceiverState).await, Ok(1));
    assert_eq!(file.ioctl(Ioctl::SetTransceiverState(3)).await, Ok(0));
    assert_eq!(rig.bus.transceiver_state(), Some(3));
}

#[tokio::test]
async fn unknown_commands_go_to_the_driver() {
    let rig = default_rig();
    let file = rig.device.open(&rw()).await.unwrap();

    let recovery = Ioctl::Driver {
        cmd: CanIoctl::BusOffRecovery.code(),
        arg: 0,
    };
    assert_eq!(file.ioctl(recovery).await, Ok(0));

    let bogus = Ioctl::Driver { cmd: 0x1234, arg: 7 };
    assert_eq!(file.ioctl(bogus).await, Err(Error::NotTty));
    assert_eq!(
        rig.bus.ioctls(),
        vec![(CanIoctl::BusOffRecovery.code(), 0), (0x1234, 7)]
    );
}

#[tokio::test]
async fn io_flush_resets_both_directions() {
    let rig = default_rig();
    let file = rig.device.open(&rw().nonblocking(true)).await.unwrap();
    file.write(&encode(&[msg(1, &[]), msg(2, &[])])).await.unwrap();
    rig.bus.inject(&rig.upper, &msg(3, &[])).unwrap();

    assert_eq!(file.ioctl(Ioctl::IoFlush).await, Ok(0));
    assert_eq!(file.pending_write().await, Ok(0));
    assert_eq!(file.pending_read().await, Ok(0));
    assert_eq!(rig.bus.ioctls(), vec![(CanIoctl::IoFlush.code(), 0)]);
}

#[tokio::test(start_paused = true)]
async fn abandoned_close_still_shuts_down() {
    let rig = default_rig();
    let file = rig.device.open(&write_only()).await.unwrap();
    file.write(&encode(&[msg(1, &[]), msg(2, &[])])).await.unwrap();

    let closing = tokio::time::timeout(std::time::Duration::from_millis(100), file.close());
    assert!(closing.await.is_err());
    assert_eq!(rig.bus.shutdowns(), 0);

    rig.bus.complete_all(&rig.upper);
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert_eq!(rig.bus.shutdowns(), 1);
    assert!(!rig.bus.is_enabled());

    let file = rig.device.open(&write_only()).await.unwrap();
    assert_eq!(rig.bus.setups(), 2);
    file.close().await;
    assert_eq!(rig.bus.shutdowns(), 2);
}
