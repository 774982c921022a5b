//! Session establishment against the wall clock.

use warden_common::SessionState;

use crate::local_agent;

#[test]
fn establish_authenticate_and_heartbeat() {
    let dir = tempfile::tempdir().unwrap();
    let agent = local_agent(dir.path());
    let cm = agent.connection();

    let est = cm.establish("127.0.0.1", 9000, "secret").unwrap();
    assert!(est.channel_id.starts_with("ch-"));
    assert_eq!(cm.status().state, SessionState::Connected);

    assert!(cm.authenticate("secret").unwrap().authenticated);
    assert_eq!(cm.status().state, SessionState::Authenticated);

    let ack = cm.send_heartbeat().unwrap();
    assert_eq!(ack.channel_id, est.channel_id);
    assert!(cm.check_heartbeat().healthy);

    assert!(cm.disconnect());
    assert!(!cm.check_heartbeat().healthy);
    assert_eq!(cm.status().state, SessionState::Disconnected);
}

#[test]
fn open_mode_accepts_any_token() {
    let dir = tempfile::tempdir().unwrap();
    let agent = local_agent(dir.path());
    agent.connection().establish("localhost", 1, "").unwrap();
    let auth = agent.connection().authenticate("anything").unwrap();
    assert!(auth.authenticated);
    assert!(auth.open_mode);
}
