mod common;

use common::{after, ok_to_everything, quiet_config, Sim};
use esp8266_at::{AtError, DriverConfig, Esp8266, RxSource, WaitMode, WaitOutcome};

#[test]
fn test_silence_times_out_with_empty_text() {
    let sim = Sim::silent();
    let mut esp = sim.polled(DriverConfig::default());

    let start = sim.now();
    let reply = esp.wait_for("OK", 1000);

    assert_eq!(reply.outcome, WaitOutcome::TimedOut);
    assert!(reply.bytes().is_empty());
    let elapsed = sim.now() - start;
    assert!(elapsed >= 1000, "returned after {} ms", elapsed);
    assert!(elapsed <= 1002, "returned after {} ms", elapsed);
}

#[test]
fn test_pattern_found_anywhere_in_stream() {
    let sim = Sim::silent();
    sim.inject(10, b"noise\r\n+IPD,3:abc");
    sim.inject(40, b"\r\nOK\r\ntrailing");
    let mut esp = sim.polled(DriverConfig::default());

    let reply = esp.wait_for("OK", 1000);
    assert_eq!(reply.outcome, WaitOutcome::Matched(0));
    assert!(reply.as_str().ends_with("OK"));
    assert!(sim.now() < 100);
}

#[test]
fn test_pattern_split_across_arrivals() {
    let sim = Sim::silent();
    sim.inject(10, b"SEND ");
    sim.inject(300, b"OK");
    let mut esp = sim.polled(DriverConfig::default());

    let reply = esp.wait_for("SEND OK", 1000);
    assert!(reply.is_found());
    assert_eq!(reply.as_str(), "SEND OK");
}

#[test]
fn test_case_matters_and_partial_text_is_kept() {
    let sim = Sim::silent();
    sim.inject(5, b"ok\r\nbusy p...\r\n");
    let mut esp = sim.polled(DriverConfig::default());

    let reply = esp.wait_for("OK", 500);
    assert_eq!(reply.outcome, WaitOutcome::TimedOut);
    assert_eq!(reply.as_str(), "ok\r\nbusy p...\r\n");
}

#[test]
fn test_match_beyond_accumulator_capacity_is_missed() {
    let sim = Sim::silent();
    // 16-byte accumulator: the pattern lands past the end
    sim.inject(5, b"0123456789abcdefOK");
    let mut esp: Esp8266<'static, _, _, 16> =
        Esp8266::new(sim.uart(), sim.clock(), RxSource::Polled, DriverConfig::default());

    let reply = esp.wait_for("OK", 200);
    assert_eq!(reply.outcome, WaitOutcome::TimedOut);
    assert_eq!(reply.bytes(), b"0123456789abcdef");
}

#[test]
fn test_match_within_accumulator_capacity_is_found() {
    let sim = Sim::silent();
    sim.inject(5, b"0123456789abcdOK");
    let mut esp: Esp8266<'static, _, _, 16> =
        Esp8266::new(sim.uart(), sim.clock(), RxSource::Polled, DriverConfig::default());

    assert!(esp.wait_for("OK", 200).is_found());
}

#[test]
fn test_first_listed_pattern_wins_on_same_byte() {
    let sim = Sim::silent();
    sim.inject(5, b"SEND FAIL");
    let mut esp = sim.polled(DriverConfig::default());

    let reply = esp.wait_for_any(&["FAIL", "SEND FAIL"], 100, WaitMode::Simple);
    assert_eq!(reply.matched(), Some(0));
}

#[test]
fn test_multiline_grace_drain_collects_trailing_bytes() {
    let sim = Sim::silent();
    sim.inject(5, b"AT version:1.7.4\r\nOK\r\n");
    sim.inject(15, b"WIFI DISCONNECT\r\n");
    let mut esp = sim.polled(DriverConfig::default());

    let reply = esp.wait_for_any(&[], 1000, WaitMode::MultiLine);
    assert_eq!(reply.outcome, WaitOutcome::Terminated);
    assert!(reply.contains("WIFI DISCONNECT"));
}

#[test]
fn test_multiline_quiet_period_ends_wait() {
    let sim = Sim::silent();
    sim.inject(5, b"+IPD,4:ping");
    let mut esp = sim.polled(DriverConfig::default());

    let reply = esp.wait_for_any(&["never"], 5000, WaitMode::MultiLine);
    assert_eq!(reply.outcome, WaitOutcome::Quiet);
    assert!(reply.is_found());
    assert_eq!(reply.as_str(), "+IPD,4:ping");
    assert!(sim.now() >= 205 && sim.now() < 300);
}

#[test]
fn test_quiet_period_can_be_disabled() {
    let sim = Sim::silent();
    sim.inject(5, b"+IPD,4:ping");
    let config = DriverConfig { quiet_period_ms: None, ..DriverConfig::default() };
    let mut esp = sim.polled(config);

    let reply = esp.wait_for_any(&["never"], 1000, WaitMode::MultiLine);
    assert_eq!(reply.outcome, WaitOutcome::TimedOut);
    assert_eq!(reply.as_str(), "+IPD,4:ping");
}

#[test]
fn test_simple_mode_ignores_quiet_period() {
    let sim = Sim::silent();
    sim.inject(5, b"WIFI CONNECTED\r\n");
    sim.inject(1500, b"WIFI GOT IP\r\n");
    let mut esp = sim.polled(DriverConfig::default());

    assert!(esp.wait_for("WIFI GOT IP", 3000).is_found());
}

#[test]
fn test_ring_buffer_source_matches_like_polled() {
    let sim = Sim::silent();
    let mut esp = sim.buffered(DriverConfig::default());
    esp.initialize().unwrap();
    sim.inject(10, b"busy s...\r\n");
    sim.inject(50, b"\r\nOK\r\n");

    let reply = esp.wait_for("OK", 1000);
    assert!(reply.is_found());
    assert_eq!(reply.as_str(), "busy s...\r\n\r\nOK");
}

#[test]
fn test_stale_input_does_not_satisfy_next_command() {
    for buffered in [false, true] {
        let sim = Sim::silent();
        let mut esp = if buffered {
            sim.buffered(quiet_config())
        } else {
            sim.polled(quiet_config())
        };
        esp.initialize().unwrap();

        // Left over from an earlier exchange
        sim.inject(0, b"\r\nOK\r\n");

        let result = esp.send_and_wait_ok("AT\r\n", 500);
        assert_eq!(result.unwrap_err(), AtError::Timeout);
    }
}

#[test]
fn test_get_buffered_text_drains_pending_bytes() {
    let sim = Sim::new(|bytes, _| {
        if bytes == b"AT+GMR\r\n" {
            after(1, "OK\r\n+IPD,5:hello")
        } else {
            Vec::new()
        }
    });
    let mut esp = sim.buffered(DriverConfig::default());
    esp.initialize().unwrap();

    assert!(esp.send_and_wait_ok("AT+GMR\r\n", 100).is_ok());

    // The matcher stopped at "OK"; the rest is still buffered
    let mut dst = [0u8; 64];
    let n = esp.get_buffered_text(&mut dst);
    assert_eq!(&dst[..n], b"\r\n+IPD,5:hello");
    assert_eq!(esp.get_buffered_text(&mut dst), 0);
}

#[test]
fn test_echoing_remote_always_confirms() {
    for buffered in [false, true] {
        let sim = Sim::new(ok_to_everything());
        let mut esp = if buffered {
            sim.buffered(DriverConfig::default())
        } else {
            sim.polled(DriverConfig::default())
        };
        esp.initialize().unwrap();

        for command in ["AT\r\n", "AT+CWMODE=1\r\n", "AT+CIPMUX=0\r\n", "ATE0\r\n", "AT+CIPMODE=0\r\n"] {
            assert!(esp.send_and_wait_ok(command, 1000).is_ok(), "{} not confirmed", command);
        }
    }
}

#[test]
fn test_error_reply_is_rejected_early() {
    let sim = Sim::new(|_, _| after(3, "\r\nERROR\r\n"));
    let mut esp = sim.polled(DriverConfig::default());

    assert_eq!(esp.send_and_wait_ok("AT+BOGUS\r\n", 5000).unwrap_err(), AtError::Rejected);
    assert!(sim.now() < 100);
}
