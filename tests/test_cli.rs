mod common;

use common::*;
use std::net::UdpSocket;
use std::time::Duration;

#[test]
fn test_port_prints_free_port() {
    let env = TestEnv::new();
    let output = env.run_command(&["port"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let port: u16 = stdout.trim().parse().unwrap();
    assert_ne!(port, 0);
}

#[test]
fn test_command_json() {
    let env = TestEnv::new();
    let temp = env.dir().to_string_lossy().to_string();
    let output = env.run_command(&[
        "command",
        "--port",
        "54321",
        "--mode",
        "packaged",
        "--temp-dir",
        &temp,
        "--json",
    ]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["port"], 54321);
    let args = json["spec"]["args"].as_array().unwrap();
    assert_eq!(args[0], temp.as_str());
    assert_eq!(args[1], "54321");
    assert_eq!(args[args.len() - 3], "54321");
    assert!(
        json["spec"]["program"]
            .as_str()
            .unwrap()
            .ends_with("launch_daemon.sh")
    );
    assert_eq!(
        json["sentinel"],
        env.dir().join("daemomnify-54321.ready").to_string_lossy().as_ref()
    );
}

#[test]
fn test_command_text() {
    let env = TestEnv::new();
    let temp = env.dir().to_string_lossy().to_string();
    let output = env.run_command(&[
        "cmd",
        "-p",
        "40000",
        "--mode",
        "development",
        "--temp-dir",
        &temp,
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--osc-port 40000"), "{stdout}");
    assert!(stdout.contains("daemomnify-40000.log"), "{stdout}");
}

#[test]
fn test_quit_sends_datagram() {
    let env = TestEnv::new();
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let port = socket.local_addr().unwrap().port().to_string();

    let output = env.run_command(&["quit", "--port", &port]);
    assert!(output.status.success());

    let mut buf = [0u8; 64];
    let (len, _) = socket.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..len], b"/quit\0\0\0,\0\0\0");
}

#[test]
fn test_unknown_mode_is_rejected() {
    let env = TestEnv::new();
    let output = env.run_command(&["command", "--mode", "release"]);
    assert!(!output.status.success());
}
