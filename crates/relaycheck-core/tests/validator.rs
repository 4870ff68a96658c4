//! End-to-end validation runs against a live test target.

#![allow(clippy::unwrap_used)]

mod common;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use common::{PASSWORD, PUBLIC_IP, Redirect, USER, plain_target, start_target, tls_target, wait_until_idle};
use relaycheck_core::{
    Settings, SmtpConfig, TestResult, TlsMode, TraceKind, Validator, validate_smtp,
};

const HOST: &str = "test-target";

fn config(addr: SocketAddr) -> SmtpConfig {
    SmtpConfig::new(HOST, i64::from(addr.port()))
}

fn validator(network: Redirect) -> Validator<Redirect> {
    Validator::with_network(network, Settings::default().step_timeout(Duration::from_secs(5)))
}

fn messages(result: &TestResult) -> Vec<&str> {
    result.trace.iter().map(|event| event.message.as_str()).collect()
}

#[tokio::test]
async fn plaintext_login_passes() {
    let (addr, sessions) = start_target(plain_target()).await;
    let network = Redirect::to(addr);
    let calls = Arc::clone(&network.calls);

    let result = validator(network)
        .validate(&config(addr).login(USER, PASSWORD))
        .await;

    assert!(result.success, "{result:#?}");
    assert_eq!(result.summary_message, "SMTP connection test successful");
    assert_eq!(
        messages(&result),
        vec![
            format!("Testing connection to {HOST}:{} (TLS mode: none)...", addr.port()).as_str(),
            "✓ DNS resolution successful: test-target -> 203.0.113.7",
            format!("Attempting connection to port {}...", addr.port()).as_str(),
            "✓ Connected to SMTP server",
            "Attempting authentication as printer@local.test...",
            "✓ Authentication successful!",
            "✓ SMTP account is ready to send emails",
            "✓ ALL TESTS PASSED! SMTP configuration is valid and working.",
        ]
    );
    assert_eq!(
        result.kinds(),
        vec![
            TraceKind::Info,
            TraceKind::Success,
            TraceKind::Info,
            TraceKind::Success,
            TraceKind::Info,
            TraceKind::Success,
            TraceKind::Success,
            TraceKind::Success,
        ]
    );

    // The checked address, not the redirect, was handed to connect
    assert_eq!(calls.connected_to(), Some(SocketAddr::new(PUBLIC_IP, addr.port())));
    assert_eq!(calls.resolves(), 1);
    wait_until_idle(&sessions).await;
}

#[tokio::test]
async fn wrong_password_fails_authentication() {
    let (addr, sessions) = start_target(plain_target()).await;

    let result = validator(Redirect::to(addr))
        .validate(&config(addr).login(USER, "wrong"))
        .await;

    assert!(!result.success);
    assert_eq!(result.summary_message, "Authentication failed");
    let last = result.last().unwrap();
    assert_eq!(last.kind, TraceKind::Error);
    assert_eq!(last.message, "✗ Authentication failed: Invalid username or password");
    // QUIT still closed the session
    wait_until_idle(&sessions).await;
}

#[tokio::test]
async fn empty_password_still_attempts_login() {
    let (addr, _) = start_target(plain_target()).await;

    let result = validator(Redirect::to(addr))
        .validate(&config(addr).login(USER, ""))
        .await;

    assert!(result.find("Attempting authentication as printer@local.test").is_some());
    assert_eq!(result.summary_message, "Authentication failed");
}

#[tokio::test]
async fn starttls_upgrade_then_login() {
    let (addr, sessions) = start_target(tls_target()).await;

    let result = validator(Redirect::to(addr))
        .validate(&config(addr).tls(TlsMode::Negotiate).login(USER, PASSWORD))
        .await;

    assert!(result.success, "{result:#?}");
    let upgraded = result.find("STARTTLS").unwrap();
    assert_eq!(upgraded.kind, TraceKind::Success);
    assert_eq!(upgraded.message, "✓ STARTTLS negotiation successful");
    wait_until_idle(&sessions).await;
}

#[tokio::test]
async fn bracketed_ipv6_host_upgrades_with_starttls() {
    let (addr, sessions) = start_target(tls_target()).await;
    let network = Redirect::to(addr);
    let calls = Arc::clone(&network.calls);

    let config = SmtpConfig::new("[2001:db8::7]", i64::from(addr.port()))
        .tls(TlsMode::Negotiate)
        .login(USER, PASSWORD);
    let result = validator(network).validate(&config).await;

    assert!(result.success, "{result:#?}");
    assert_eq!(
        result.find("STARTTLS").unwrap().message,
        "✓ STARTTLS negotiation successful"
    );
    assert!(result.find("Reconnected without TLS").is_none());
    assert!(result.find("⚠").is_none(), "{result:#?}");
    assert_eq!(calls.connects(), 1);
    wait_until_idle(&sessions).await;
}

#[tokio::test]
async fn repeated_runs_produce_the_same_trace() {
    let (addr, sessions) = start_target(tls_target()).await;
    let validator = validator(Redirect::to(addr));

    for config in [
        config(addr).tls(TlsMode::Negotiate).login(USER, PASSWORD),
        config(addr).tls(TlsMode::Negotiate).login(USER, "wrong"),
        config(addr).login(USER, "wrong"),
    ] {
        let first = validator.validate(&config).await;
        let second = validator.validate(&config).await;
        assert_eq!(first.success, second.success);
        assert_eq!(first.kinds(), second.kinds());
        assert_eq!(messages(&first), messages(&second));
        assert_eq!(first.summary_message, second.summary_message);
    }

    let rejected = validator.validate(&config(addr).login(USER, "wrong")).await;
    assert_eq!(
        rejected.kinds(),
        vec![
            TraceKind::Info,
            TraceKind::Success,
            TraceKind::Info,
            TraceKind::Success,
            TraceKind::Info,
            TraceKind::Error,
        ]
    );
    wait_until_idle(&sessions).await;
}

#[tokio::test]
async fn missing_starttls_downgrades_with_warning() {
    let (addr, _) = start_target(plain_target()).await;

    let result = validator(Redirect::to(addr))
        .validate(&config(addr).tls(TlsMode::Tls).login(USER, PASSWORD))
        .await;

    assert!(result.success, "{result:#?}");
    let warning = result.find("STARTTLS failed").unwrap();
    assert_eq!(warning.kind, TraceKind::Warning);
    assert_eq!(warning.message, "⚠ STARTTLS failed: Server does not support STARTTLS");
}

#[tokio::test]
async fn verified_starttls_reconnects_in_plaintext() {
    let (addr, _) = start_target(tls_target()).await;
    let network = Redirect::to(addr);
    let calls = Arc::clone(&network.calls);
    let validator = Validator::with_network(
        network,
        Settings::default()
            .step_timeout(Duration::from_secs(5))
            .verify_starttls(true),
    );

    let result = validator
        .validate(&config(addr).tls(TlsMode::Negotiate).login(USER, PASSWORD))
        .await;

    // The fixture certificate is self-signed, so the handshake is lost
    assert!(result.success, "{result:#?}");
    assert_eq!(result.find("⚠ STARTTLS failed").unwrap().kind, TraceKind::Warning);
    assert!(result.find("Reconnected without TLS").is_some());
    assert_eq!(calls.connects(), 2);
}

#[tokio::test]
async fn skipped_authentication_is_a_warning() {
    let (addr, _) = start_target(plain_target()).await;

    let result = validator(Redirect::to(addr)).validate(&config(addr)).await;

    assert!(result.success);
    assert_eq!(
        result.kinds(),
        vec![
            TraceKind::Info,
            TraceKind::Success,
            TraceKind::Info,
            TraceKind::Success,
            TraceKind::Warning,
            TraceKind::Success,
        ]
    );
    assert_eq!(
        result.trace[4].message,
        "⚠ No authentication configured - skipping auth test"
    );
}

#[tokio::test]
async fn private_address_is_blocked_before_connect() {
    let (addr, sessions) = start_target(plain_target()).await;
    let private = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
    let network = Redirect::resolving(addr, vec![private]);
    let calls = Arc::clone(&network.calls);

    let result = validator(network)
        .validate(&config(addr).login(USER, PASSWORD))
        .await;

    assert!(!result.success);
    assert_eq!(result.summary_message, "SSRF protection: target IP is not permitted");
    assert_eq!(
        result.kinds(),
        vec![TraceKind::Info, TraceKind::Success, TraceKind::Error]
    );
    assert_eq!(
        result.last().unwrap().message,
        "✗ Hostname resolves to a private/reserved IP (10.0.0.5) - connection blocked"
    );
    assert_eq!(calls.connects(), 0);
    assert_eq!(sessions.active(), 0);
}

#[tokio::test]
async fn one_blocked_address_among_many_is_enough() {
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let network = Redirect::resolving(SocketAddr::from(([127, 0, 0, 1], 9)), vec![PUBLIC_IP, loopback]);
    let calls = Arc::clone(&network.calls);

    let result = validator(network)
        .validate(&SmtpConfig::new(HOST, 587))
        .await;

    assert_eq!(result.summary_message, "SSRF protection: target IP is not permitted");
    assert!(result.last().unwrap().message.contains("(127.0.0.1)"));
    assert_eq!(calls.connects(), 0);
}

#[tokio::test]
async fn mapped_ipv6_loopback_is_blocked() {
    let mapped = IpAddr::V6(Ipv4Addr::LOCALHOST.to_ipv6_mapped());
    let result = validator(Redirect::resolving(SocketAddr::from(([127, 0, 0, 1], 9)), vec![mapped]))
        .validate(&SmtpConfig::new(HOST, 587))
        .await;
    assert_eq!(result.summary_message, "SSRF protection: target IP is not permitted");

    let unique_local = IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1));
    let result = validator(Redirect::resolving(SocketAddr::from(([127, 0, 0, 1], 9)), vec![unique_local]))
        .validate(&SmtpConfig::new(HOST, 587))
        .await;
    assert_eq!(result.summary_message, "SSRF protection: target IP is not permitted");
}

#[tokio::test]
async fn nat64_and_6to4_private_targets_are_blocked() {
    let nat64 = IpAddr::V6(Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0x0a00, 0x0005));
    let six_to_four = IpAddr::V6(Ipv6Addr::new(0x2002, 0x7f00, 0x0001, 0, 0, 0, 0, 1));
    for ip in [nat64, six_to_four] {
        let network = Redirect::resolving(SocketAddr::from(([127, 0, 0, 1], 9)), vec![ip]);
        let calls = Arc::clone(&network.calls);
        let result = validator(network).validate(&SmtpConfig::new(HOST, 587)).await;
        assert_eq!(
            result.summary_message, "SSRF protection: target IP is not permitted",
            "{ip}"
        );
        assert_eq!(calls.connects(), 0);
    }
}

#[tokio::test]
async fn invalid_configuration_never_resolves() {
    for config in [
        SmtpConfig::new(HOST, 0),
        SmtpConfig::new(HOST, 65_536),
        SmtpConfig::new("  ", 587),
    ] {
        let network = Redirect::unresolvable();
        let calls = Arc::clone(&network.calls);
        let result = validator(network).validate(&config).await;

        assert!(!result.success);
        assert_eq!(result.summary_message, "Invalid configuration");
        assert_eq!(result.kinds(), vec![TraceKind::Error]);
        assert_eq!(calls.resolves(), 0);
    }
}

#[tokio::test]
async fn unresolvable_host() {
    let result = validator(Redirect::unresolvable())
        .validate(&SmtpConfig::new("nowhere.invalid", 587))
        .await;

    assert_eq!(result.summary_message, "DNS resolution failed");
    assert_eq!(
        messages(&result),
        vec![
            "Testing connection to nowhere.invalid:587 (TLS mode: none)...",
            "✗ Cannot resolve hostname: nowhere.invalid",
        ]
    );
}

#[tokio::test]
async fn refused_connection() {
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let result = validator(Redirect::to(closed))
        .validate(&SmtpConfig::new(HOST, 2525))
        .await;

    assert_eq!(result.summary_message, "Connection failed");
    assert_eq!(result.last().unwrap().message, "✗ Cannot connect to test-target:2525");
}

#[tokio::test]
async fn silent_server_times_out() {
    // Bound but never accepted: the handshake completes, no greeting arrives
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let validator = Validator::with_network(
        Redirect::to(addr),
        Settings::default().step_timeout(Duration::from_millis(200)),
    );

    let result = validator.validate(&config(addr)).await;

    assert_eq!(result.summary_message, "Connection timeout");
    assert_eq!(
        result.last().unwrap().message,
        "✗ Connection timeout - server not responding"
    );
    drop(listener);
}

#[tokio::test]
async fn implicit_tls_against_plaintext_is_a_connection_error() {
    let (addr, _) = start_target(plain_target()).await;

    let result = validator(Redirect::to(addr))
        .validate(&config(addr).tls(TlsMode::Ssl))
        .await;

    assert!(!result.success);
    assert!(
        result.summary_message.starts_with("Connection error: "),
        "{}",
        result.summary_message
    );
    assert!(result.last().unwrap().message.starts_with("✗ Connection error: "));
    assert!(result.find("implicit TLS").is_none());
}

#[tokio::test]
async fn validator_is_shareable_across_tasks() {
    let (addr, sessions) = start_target(plain_target()).await;
    let validator = Arc::new(validator(Redirect::to(addr)));

    let runs: Vec<_> = (0..4)
        .map(|_| {
            let validator = Arc::clone(&validator);
            tokio::spawn(async move {
                validator
                    .validate(&config(addr).login(USER, PASSWORD))
                    .await
            })
        })
        .collect();

    for run in runs {
        assert!(run.await.unwrap().success);
    }
    wait_until_idle(&sessions).await;
}

#[tokio::test]
async fn system_network_blocks_loopback_literals() {
    for host in ["127.0.0.1", "::1", "[::1]", "169.254.169.254"] {
        let result = validate_smtp(&SmtpConfig::new(host, 25)).await;
        assert_eq!(
            result.summary_message, "SSRF protection: target IP is not permitted",
            "{host}"
        );
    }
}

#[tokio::test]
async fn timestamps_never_go_backwards() {
    let (addr, _) = start_target(plain_target()).await;
    let result = validator(Redirect::to(addr))
        .validate(&config(addr).login(USER, PASSWORD))
        .await;
    assert!(result.trace.windows(2).all(|pair| pair[0].at <= pair[1].at));
}
