mod common;

use std::sync::Arc;
use std::time::Duration;

use bbsfw_core::config::{self, AssistFlags, Configuration};
use bbsfw_core::device::ControllerType;
use bbsfw_core::eventlog::LogLevel;
use bbsfw_core::protocol::{
    Connection, ConnectionEvent, ConnectionState, ProtocolError, RequestResult,
};
use common::{frame, init_tracing, test_config, FakeDevice, FakeTransport, MISSING_PORT};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

const PORT: &str = "/dev/ttyFAKE0";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

fn setup() -> (Connection, FakeDevice) {
    init_tracing();
    let device = FakeDevice::new();
    let connection = Connection::with_transport(
        test_config(),
        FakeTransport {
            device: device.clone(),
        },
    );
    (connection, device)
}

async fn connected() -> (Connection, FakeDevice) {
    let (connection, device) = setup();
    let connected = connection
        .connect(PORT, CONNECT_TIMEOUT)
        .await
        .expect("connect failed");
    assert!(connected);
    (connection, device)
}

fn sample_config() -> Configuration {
    let mut config = Configuration::factory_defaults();
    config.max_current_amps = 30;
    config.max_speed_kph = 45;
    config.wheel_size_inch = 27.5;
    config.sport_assist_levels[9].flags = AssistFlags::PAS | AssistFlags::PAS_TORQUE;
    config.sport_assist_levels[9].torque_amplification_factor = 1.5;
    config
}

#[tokio::test]
async fn test_handshake_legacy_firmware() {
    let (connection, device) = setup();
    assert!(connection.connect(PORT, CONNECT_TIMEOUT).await.unwrap());

    assert_eq!(connection.state(), ConnectionState::Connected);
    let info = connection.device_info().expect("device info");
    assert_eq!(info.firmware_version, "1.2.0");
    assert_eq!(info.config_version, 3);
    assert_eq!(info.controller, ControllerType::Unknown);

    let received = device.received();
    assert_eq!(received[0], vec![0x01, 0x01, 0x02]);
    assert!(received.contains(&vec![0x02, 0xf0, 0x01, 0xf3]));
}

#[tokio::test]
async fn test_handshake_reports_controller() {
    let (connection, device) = setup();
    device.set_fw_version(frame(&[0x01, 0x01, 0x01, 0x05, 0x01, 0x03, 0x01]));

    assert!(connection.connect(PORT, CONNECT_TIMEOUT).await.unwrap());
    let info = connection.device_info().unwrap();
    assert_eq!(info.firmware_version, "1.5.1");
    assert_eq!(info.controller, ControllerType::Bbshd);
}

#[tokio::test]
async fn test_handshake_timeout() {
    let (connection, device) = setup();
    device.mute_handshake();

    let connected = connection
        .connect(PORT, Duration::from_millis(300))
        .await
        .unwrap();
    assert!(!connected);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(connection.device_info().is_none());

    // retried every handshake interval
    assert!(device.count_received(&[0x01, 0x01]) >= 3);
    assert_eq!(device.open_channels(), 0);
}

#[tokio::test]
async fn test_connect_twice_rejected() {
    let (connection, _device) = connected().await;
    assert!(matches!(
        connection.connect(PORT, CONNECT_TIMEOUT).await,
        Err(ProtocolError::AlreadyConnected)
    ));
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_missing_port() {
    let (connection, _device) = setup();
    assert!(matches!(
        connection.connect(MISSING_PORT, CONNECT_TIMEOUT).await,
        Err(ProtocolError::PortNotFound(_))
    ));
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_read_configuration() {
    let (connection, device) = connected().await;
    let expected = sample_config();
    device.set_record(3, config::encode(&expected));

    let result = connection.read_configuration(REQUEST_TIMEOUT).await.unwrap();
    assert_eq!(result, RequestResult::Completed(expected));
}

#[tokio::test]
async fn test_read_configuration_times_out() {
    let (connection, device) = connected().await;
    device.set_responsive(false);

    let result = connection
        .read_configuration(Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(result, RequestResult::TimedOut);
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_write_configuration() {
    let (connection, device) = connected().await;
    let config = sample_config();

    let result = connection
        .write_configuration(&config, REQUEST_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result, RequestResult::Completed(true));
    assert_eq!(device.record(), config::encode(&config));

    // and reading it back returns the same record
    let read = connection.read_configuration(REQUEST_TIMEOUT).await.unwrap();
    assert_eq!(read, RequestResult::Completed(config));
}

#[tokio::test]
async fn test_write_configuration_rejected_by_controller() {
    let (connection, device) = connected().await;
    device.set_write_status(0);

    let result = connection
        .write_configuration(&sample_config(), REQUEST_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result, RequestResult::Completed(false));
}

#[tokio::test]
async fn test_invalid_configuration_not_sent() {
    let (connection, device) = connected().await;
    let mut config = sample_config();
    config.max_current_amps = 4;

    let err = connection
        .write_configuration(&config, REQUEST_TIMEOUT)
        .await
        .unwrap_err();
    match err {
        ProtocolError::Validation(e) => {
            assert_eq!(e.to_string(), "Max Current (A) must be in interval 5-33.")
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(device.count_received(&[0x02, 0xf1]), 0);
}

#[tokio::test]
async fn test_bbshd_allows_higher_current() {
    let (connection, device) = setup();
    device.set_fw_version(frame(&[0x01, 0x01, 0x01, 0x05, 0x00, 0x03, 0x01]));
    assert!(connection.connect(PORT, CONNECT_TIMEOUT).await.unwrap());

    let mut config = sample_config();
    config.max_current_amps = 35;
    let result = connection
        .write_configuration(&config, REQUEST_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result, RequestResult::Completed(true));
}

#[tokio::test]
async fn test_older_config_version_not_written() {
    let (connection, device) = setup();
    device.set_fw_version(frame(&[0x01, 0x01, 0x01, 0x00, 0x04, 0x01]));
    device.set_record(1, vec![0u8; 122]);
    assert!(connection.connect(PORT, CONNECT_TIMEOUT).await.unwrap());

    let err = connection
        .write_configuration(&sample_config(), REQUEST_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::UnsupportedConfigVersion {
            device: 1,
            supported: 3
        }
    ));
    assert_eq!(device.count_received(&[0x02, 0xf1]), 0);

    // older records can still be read
    let read = connection.read_configuration(REQUEST_TIMEOUT).await.unwrap();
    let config = read.completed().expect("config");
    assert!(config.use_shift_sensor);
    assert_eq!(config.pas_keep_current_cadence_rpm, 255);
}

#[tokio::test]
async fn test_reset_configuration() {
    let (connection, device) = connected().await;
    device.set_record(3, config::encode(&sample_config()));

    let result = connection.reset_configuration(REQUEST_TIMEOUT).await.unwrap();
    assert_eq!(result, RequestResult::Completed(true));
    assert_eq!(
        device.record(),
        config::encode(&Configuration::factory_defaults())
    );
}

#[tokio::test]
async fn test_calibrate_voltage() {
    let (connection, device) = connected().await;

    let result = connection
        .calibrate_voltage(52.5, REQUEST_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result, RequestResult::Completed(true));
    assert!(device
        .received()
        .contains(&frame(&[0x02, 0xf3, 0x14, 0x82])));
}

#[tokio::test]
async fn test_event_log_forwarded() {
    let (connection, device) = setup();
    let (tx, mut rx) = mpsc::unbounded_channel();
    connection.set_observer(Arc::new(tx));

    assert!(connection.connect(PORT, CONNECT_TIMEOUT).await.unwrap());
    match rx.recv().await {
        Some(ConnectionEvent::Connected(info)) => assert_eq!(info.firmware_version, "1.2.0"),
        other => panic!("expected connected event, got {:?}", other),
    }

    device.push(&frame(&[0xed, 0x82, 0x00, 0x64]));
    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no event log entry");
    match event {
        Some(ConnectionEvent::EventLog(entry)) => {
            assert_eq!(entry.code, 0x82);
            assert_eq!(entry.data, Some(100));
            assert_eq!(entry.level, LogLevel::Error);
            assert!(entry.message.contains("0x64"));
        }
        other => panic!("expected event log entry, got {:?}", other),
    }
}

#[tokio::test]
async fn test_corrupt_bytes_do_not_break_link() {
    let (connection, device) = connected().await;

    device.push(&[0x02, 0xf1, 0x01, 0x00]);
    device.push(&[0x42, 0x42]);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = connection.reset_configuration(REQUEST_TIMEOUT).await.unwrap();
    assert_eq!(result, RequestResult::Completed(true));
}

#[tokio::test]
async fn test_read_error_closes_connection() {
    let (connection, device) = setup();
    let (tx, mut rx) = mpsc::unbounded_channel();
    connection.set_observer(Arc::new(tx));
    assert!(connection.connect(PORT, CONNECT_TIMEOUT).await.unwrap());

    device.fail_reads();
    let mut disconnected = false;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        if matches!(event, ConnectionEvent::Disconnected) {
            disconnected = true;
            break;
        }
    }
    assert!(disconnected);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(device.wait_until(Duration::from_secs(1), |d| d.open_channels() == 0));

    assert!(matches!(
        connection.read_configuration(REQUEST_TIMEOUT).await,
        Err(ProtocolError::NotConnected)
    ));
}

#[tokio::test]
async fn test_close_aborts_pending_request() {
    let (connection, device) = connected().await;
    device.set_responsive(false);

    let (result, _) = tokio::join!(connection.read_configuration(Duration::from_secs(5)), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        connection.close();
    });
    assert!(matches!(result, Err(ProtocolError::ConnectionLost)));
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (connection, device) = setup();
    let (tx, mut rx) = mpsc::unbounded_channel();
    connection.set_observer(Arc::new(tx));
    assert!(connection.connect(PORT, CONNECT_TIMEOUT).await.unwrap());

    connection.close();
    connection.close();
    assert_eq!(device.open_channels(), 0);

    let mut disconnects = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, ConnectionEvent::Disconnected) {
            disconnects += 1;
        }
    }
    assert_eq!(disconnects, 1);

    // and a fresh connection can be made
    assert!(connection.connect(PORT, CONNECT_TIMEOUT).await.unwrap());
}

#[tokio::test]
async fn test_drop_releases_transport() {
    let (connection, device) = connected().await;
    assert_eq!(device.open_channels(), 2);
    drop(connection);
    assert_eq!(device.open_channels(), 0);
}
