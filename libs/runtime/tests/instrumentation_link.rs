//! Instrumentation link against a controller on a loopback TCP socket

mod common;

use codec::{
    CommandHeader, CommandId, DataExchangeAction, FailureRequest, RegisterPacket,
    RegistrationKind, Request, Response, StateRequest, ACK_OK,
};
use common::{framed, inject, FaultySocket};
use runtime::{Context, ContextBuilder, PortSpec};
use skybus_config::ContextConfig;
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream, UdpSocket};
use std::thread;
use std::time::Duration;
use types::{Direction, PortKind, RunState};

const PERIOD_US: u64 = 100_000;
const WAIT: Duration = Duration::from_secs(2);

fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut frame = vec![0u8; CommandHeader::SIZE];
    stream.read_exact(&mut frame).unwrap();
    let header = CommandHeader::parse(&frame).unwrap();
    frame.resize(header.frame_size(), 0);
    stream.read_exact(&mut frame[CommandHeader::SIZE..]).unwrap();
    frame
}

fn read_response(stream: &mut TcpStream) -> Response {
    Response::parse(&read_frame(stream)).unwrap()
}

struct Bench {
    context: Context,
    controller: TcpStream,
    observer: UdpSocket,
}

/// Context with one loopback output channel, registered on a controller
/// that acknowledges every handshake
fn bench(vc_name: &str) -> Bench {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let controller_port = listener.local_addr().unwrap().port();
    let observer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    observer
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let observer_port = observer.local_addr().unwrap().port();

    let config = ContextConfig::from_toml_str(&format!(
        r#"
vc_name = "{vc_name}"
prod_id = 4
period_us = {period_us}

[instrumentation]
address = "127.0.0.1:{controller_port}"
register = ["instrum", "sync"]

[[ports]]
channel = "ADC"
address = "127.0.0.1:{observer_port}"
direction = "output"
kind = "analogue"

[[ports.messages]]
name = "ALTITUDE"
"#,
        period_us = PERIOD_US,
    ))
    .unwrap();

    let handshake = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut kinds = Vec::new();
        for _ in 0..2 {
            let packet = RegisterPacket::parse(&read_frame(&mut stream)).unwrap();
            assert!(packet.register);
            stream
                .write_all(
                    &Response::Ack {
                        command: packet.kind.response_id(),
                        status: ACK_OK,
                    }
                    .encode(),
                )
                .unwrap();
            kinds.push(packet.kind);
        }
        (stream, kinds)
    });

    let context = ContextBuilder::new(&config).build().unwrap();
    let (controller, kinds) = handshake.join().unwrap();
    assert_eq!(kinds, vec![RegistrationKind::Instrum, RegistrationKind::Sync]);
    controller.set_read_timeout(Some(WAIT)).unwrap();

    Bench {
        context,
        controller,
        observer,
    }
}

impl Bench {
    fn request(&mut self, request: Request) {
        self.controller.write_all(&request.encode()).unwrap();
        assert!(self.context.import(WAIT).unwrap() >= 1);
    }

    fn observed(&self) -> bool {
        let mut buffer = [0u8; 64];
        match self.observer.recv(&mut buffer) {
            Ok(_) => true,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => false,
            Err(e) => panic!("observer failed: {}", e),
        }
    }
}

#[test_log::test]
fn test_synchro_acknowledged_after_requested_steps() {
    let mut bench = bench("FCS_SYNC");
    assert!(bench
        .context
        .instrumentation()
        .unwrap()
        .is_registered(RegistrationKind::Sync));

    bench.request(Request::Synchro { steps: 2 });
    assert_eq!(bench.context.time_before_notify_us(), 2 * PERIOD_US);

    bench.context.progress(PERIOD_US).unwrap();
    assert_eq!(bench.context.get_synchro_steps_request(), 2);
    assert_eq!(bench.context.time_before_notify_us(), PERIOD_US);

    bench.context.progress(PERIOD_US).unwrap();
    assert_eq!(
        read_response(&mut bench.controller),
        Response::Ack {
            command: CommandId::RSynchro,
            status: ACK_OK,
        }
    );
    assert_eq!(bench.context.get_synchro_steps_request(), 0);
    assert_eq!(bench.context.time_before_notify_us(), 0);
}

#[test_log::test]
fn test_state_and_power_requests() {
    let mut bench = bench("FCS_STATE");

    let step = StateRequest {
        state_id: StateRequest::state_id_of(RunState::Step),
        synchro_mode: 1,
        time_ratio: 2.0,
    };
    bench.request(Request::State(step));
    assert_eq!(
        read_response(&mut bench.controller),
        Response::State {
            ack_id: step.state_id,
            ack_value: ACK_OK,
            end_status: 0,
        }
    );
    assert_eq!(bench.context.run_state(), RunState::Step);
    assert!(!bench.context.is_autonomous_realtime());
    assert_eq!(bench.context.time_ratio(), 2.0);

    bench.request(Request::PowerSupply { command_id: 0 });
    assert_eq!(
        read_response(&mut bench.controller),
        Response::Ack {
            command: CommandId::RPowerSupply,
            status: ACK_OK,
        }
    );
    assert!(!bench.context.is_powered());
}

#[test_log::test]
fn test_failure_request_silences_a_channel() {
    let mut bench = bench("FCS_FAILURE");

    bench.context.send_all().unwrap();
    assert!(bench.observed());

    bench.request(Request::Failure(FailureRequest {
        channel: "ADC".to_string(),
        action: DataExchangeAction::Stop,
        direction: Direction::Output,
    }));
    assert_eq!(
        read_response(&mut bench.controller),
        Response::Ack {
            command: CommandId::RFailure,
            status: ACK_OK,
        }
    );
    bench.context.send_all().unwrap();
    assert!(!bench.observed());

    bench.context.restore_channels();
    bench.context.send_all().unwrap();
    assert!(bench.observed());

    bench.request(Request::Failure(FailureRequest {
        channel: "UNKNOWN".to_string(),
        action: DataExchangeAction::Stop,
        direction: Direction::Output,
    }));
    assert_eq!(
        read_response(&mut bench.controller),
        Response::Ack {
            command: CommandId::RFailure,
            status: codec::ACK_ERROR,
        }
    );
}

#[test_log::test]
fn test_drop_unregisters_every_kind() {
    let bench = bench("FCS_DROP");
    let Bench {
        context,
        mut controller,
        ..
    } = bench;
    drop(context);

    let kinds: Vec<RegistrationKind> = (0..2)
        .map(|_| {
            let packet = RegisterPacket::parse(&read_frame(&mut controller)).unwrap();
            assert!(!packet.register);
            assert_eq!(packet.vc_name, "FCS_DROP");
            packet.kind
        })
        .collect();
    assert_eq!(kinds, vec![RegistrationKind::Instrum, RegistrationKind::Sync]);
}

#[test_log::test]
fn test_requests_survive_a_failing_data_socket() {
    let mut bench = bench("FCS_FAULT");
    let (socket, port) = FaultySocket::bind();
    let spec = PortSpec::new("NAD_IN", PortKind::Nad, Direction::Input).with_payload_size(4);
    bench.context.add_port(&spec, socket).unwrap();

    bench
        .controller
        .write_all(&Request::Synchro { steps: 2 }.encode())
        .unwrap();
    inject(port, &framed(&[1, 2, 3, 4]));
    thread::sleep(Duration::from_millis(100));

    assert!(bench.context.import(WAIT).is_err());
    assert_eq!(bench.context.time_before_notify_us(), 2 * PERIOD_US);
    assert_eq!(bench.context.get_synchro_steps_request(), 2);
}
