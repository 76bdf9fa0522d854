//! End-to-end behavior of the context on in-process sockets

mod common;

use codec::{FrameHeader, HEADER_SIZE};
use common::RecordingSocket;
use runtime::{Context, EngineError, MessageBody, MessageShape, MessageSpec, PortSpec};
use types::{Direction, NadType, PortKind, Validity};

const PERIOD_US: u64 = 100_000;

fn context() -> Context {
    Context::new("FCS_1", 12, PERIOD_US)
}

fn analogue(offset: usize, scale: f32, gain: f32) -> MessageShape {
    MessageShape::Analogue {
        offset,
        scale,
        gain,
        init: None,
    }
}

#[test]
fn test_analogue_scale_and_gain() {
    let mut context = context();
    let spec = PortSpec::new("ADC", PortKind::Analogue, Direction::Output).with_payload_size(4);
    let (socket, wire) = RecordingSocket::output(41_000);
    let port = context.add_port(&spec, socket).unwrap();
    let altitude = context
        .register(port, "ALT", MessageSpec::new("ALT", analogue(0, 2.0, 1.0)))
        .unwrap();

    let before = context.message(altitude).unwrap().read(0).unwrap();
    assert_eq!(before.validity, Validity::NeverReceived);
    assert!(before.data.is_empty());

    context.write_sampling(altitude, &3.0f32.to_ne_bytes()).unwrap();
    let MessageBody::Analogue(body) = context.message(altitude).unwrap().body() else {
        panic!("analogue body expected");
    };
    assert_eq!(f32::from_be_bytes(body.wire()), 7.0);

    let after = context.message(altitude).unwrap().read(0).unwrap();
    assert_eq!(after.validity, Validity::Valid);
    assert_eq!(after.data, 3.0f32.to_ne_bytes().to_vec());

    assert_eq!(context.send_all().unwrap(), 1);
    let wire = wire.lock();
    let payload: [u8; 4] = wire.sent[0][HEADER_SIZE..].try_into().unwrap();
    assert_eq!(f32::from_be_bytes(payload), 7.0);
}

#[test]
fn test_nad_size_and_validity() {
    let mut context = context();
    let spec = PortSpec::new("NAD", PortKind::Nad, Direction::Output).with_payload_size(8);
    let (socket, _wire) = RecordingSocket::output(41_001);
    let port = context.add_port(&spec, socket).unwrap();
    let block = context
        .register(
            port,
            "BLOCK",
            MessageSpec::new(
                "BLOCK",
                MessageShape::Nad {
                    offset: 0,
                    size: 8,
                    nad_type: NadType::C08,
                    dims: vec![8],
                },
            ),
        )
        .unwrap();

    let err = context.write_nad(block, &[0; 9]).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidSize {
            expected: 8,
            actual: 9,
            ..
        }
    ));
    assert!(context.write_sampling(block, &[0; 8]).is_err());

    context.write_nad(block, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    assert_eq!(
        context.message(block).unwrap().read(0).unwrap().validity,
        Validity::Valid
    );
    context.progress(3_600_000_000).unwrap();
    let reading = context.message(block).unwrap().read(context.time_us()).unwrap();
    assert_eq!(reading.validity, Validity::Valid);
    assert_eq!(reading.data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_periodic_port_sends_once_per_period() {
    let mut context = context();
    let spec = PortSpec::new("ADC", PortKind::Analogue, Direction::Output)
        .with_payload_size(4)
        .with_period_us(2 * PERIOD_US)
        .with_header(codec::HeaderFlags::ALL);
    let (socket, wire) = RecordingSocket::output(41_002);
    let port = context.add_port(&spec, socket).unwrap();
    context
        .register(port, "SPEED", MessageSpec::new("SPEED", analogue(0, 1.0, 0.0)))
        .unwrap();

    let mut sends = Vec::new();
    for _ in 0..5 {
        sends.push(context.send_all().unwrap());
        context.progress(PERIOD_US).unwrap();
    }
    assert_eq!(sends, vec![1, 0, 1, 0, 1]);

    let wire = wire.lock();
    let headers: Vec<FrameHeader> = wire
        .sent
        .iter()
        .map(|datagram| FrameHeader::parse(datagram).unwrap())
        .collect();
    assert!(headers.iter().all(|header| header.prod_id == 12));
    assert_eq!(
        headers.iter().map(|h| h.seq_num).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(headers[1].data_timestamp, 2 * PERIOD_US);
}

#[test]
fn test_discrete_port_sends_on_change_only() {
    let mut context = context();
    let spec = PortSpec::new("DIS", PortKind::Discrete, Direction::Output).with_payload_size(1);
    let (socket, wire) = RecordingSocket::output(41_003);
    let port = context.add_port(&spec, socket).unwrap();
    let door = context
        .register(
            port,
            "DOOR",
            MessageSpec::new(
                "DOOR",
                MessageShape::Discrete {
                    offset: 0,
                    true_state: 0xA5,
                    false_state: 0x5A,
                    init: Some(false),
                },
            ),
        )
        .unwrap();

    assert_eq!(context.send_all().unwrap(), 0);
    context.write_sampling(door, &[0]).unwrap();
    assert_eq!(context.send_all().unwrap(), 0);
    context.write_sampling(door, &[1]).unwrap();
    assert_eq!(context.send_all().unwrap(), 1);
    assert_eq!(context.send_all().unwrap(), 0);

    // reset restores the initial state and resends it
    context.reset_all();
    assert_eq!(context.send_all().unwrap(), 1);

    let wire = wire.lock();
    assert_eq!(wire.sent[0][HEADER_SIZE], 0xA5);
    assert_eq!(wire.sent[1][HEADER_SIZE], 0x5A);
}

#[test]
fn test_queuing_output_capacity() {
    let mut context = context();
    let spec = PortSpec::new("ROUTE", PortKind::AfdxQueuing, Direction::Output);
    let (socket, wire) = RecordingSocket::output(41_004);
    let port = context.add_port(&spec, socket).unwrap();
    let route = context
        .register(
            port,
            "ROUTE",
            MessageSpec::new("ROUTE", MessageShape::AfdxQueuing { size: 2, depth: 2 }),
        )
        .unwrap();

    context.push_queuing(route, &[1, 1]).unwrap();
    context.push_queuing(route, &[2, 2]).unwrap();
    let err = context.push_queuing(route, &[3, 3]).unwrap_err();
    assert!(matches!(err, EngineError::QueueFull { depth: 2, .. }));
    assert_eq!(context.queuing_pending(route).unwrap(), 2);
    assert_eq!(context.queued_ports(), 1);

    assert_eq!(context.send_all().unwrap(), 2);
    assert_eq!(context.queuing_pending(route).unwrap(), 0);
    let wire = wire.lock();
    assert_eq!(&wire.sent[0][HEADER_SIZE..], &[1, 1]);
    assert_eq!(&wire.sent[1][HEADER_SIZE..], &[2, 2]);
}

#[test]
fn test_validity_window_follows_simulation_time() {
    let mut context = context();
    let spec = PortSpec::new("AFDX", PortKind::AfdxSampling, Direction::Output);
    let (socket, _wire) = RecordingSocket::output(41_005);
    let port = context.add_port(&spec, socket).unwrap();
    let status = context
        .register(
            port,
            "STATUS",
            MessageSpec::new(
                "STATUS",
                MessageShape::AfdxSampling {
                    size: 2,
                    init: Some(vec![0, 0]),
                },
            )
            .with_validity_duration_us(PERIOD_US),
        )
        .unwrap();

    let read = |context: &Context| {
        context
            .message(status)
            .unwrap()
            .read(context.time_us())
            .unwrap()
            .validity
    };

    assert_eq!(read(&context), Validity::NeverReceivedButInitialized);
    context.write_sampling(status, &[1, 2]).unwrap();
    assert_eq!(read(&context), Validity::Valid);
    context.progress(PERIOD_US + 1).unwrap();
    assert_eq!(read(&context), Validity::Invalid);

    context.write_sampling(status, &[3, 4]).unwrap();
    assert_eq!(read(&context), Validity::Valid);
    context.invalidate(status).unwrap();
    assert_eq!(read(&context), Validity::Invalid);

    context.set_validity_duration(status, 0).unwrap();
    assert_eq!(context.validity_duration(status).unwrap(), 0);
    context.write_sampling(status, &[5, 6]).unwrap();
    context.progress(10 * PERIOD_US).unwrap();
    assert_eq!(read(&context), Validity::Valid);
}

#[test]
fn test_get_message_checks_the_application_view() {
    let mut context = context();
    let spec = PortSpec::new("ADC", PortKind::Analogue, Direction::Output).with_payload_size(4);
    let (socket, _wire) = RecordingSocket::output(41_006);
    let port = context.add_port(&spec, socket).unwrap();
    context
        .register(port, "ALT", MessageSpec::new("ALT", analogue(0, 1.0, 0.0)))
        .unwrap();

    assert!(context
        .get_message("ALT", types::Protocol::Analogue, 4, 1, Direction::Output)
        .is_ok());
    assert!(context
        .get_message("ALT", types::Protocol::Analogue, 4, 1, Direction::Input)
        .is_err());
    assert!(matches!(
        context.get_message("VSPEED", types::Protocol::Analogue, 4, 1, Direction::Output),
        Err(EngineError::MessageNotFound { .. })
    ));
}

#[test]
fn test_invalidate_all_skips_messages_without_validity() {
    let mut context = context();

    let spec = PortSpec::new("ROUTE", PortKind::AfdxQueuing, Direction::Output);
    let (socket, _wire) = RecordingSocket::output(41_007);
    let port = context.add_port(&spec, socket).unwrap();
    let route = context
        .register(
            port,
            "ROUTE",
            MessageSpec::new("ROUTE", MessageShape::AfdxQueuing { size: 2, depth: 2 }),
        )
        .unwrap();

    let spec = PortSpec::new("NAD", PortKind::Nad, Direction::Output).with_payload_size(4);
    let (socket, _wire) = RecordingSocket::output(41_008);
    let port = context.add_port(&spec, socket).unwrap();
    let block = context
        .register(
            port,
            "BLOCK",
            MessageSpec::new(
                "BLOCK",
                MessageShape::Nad {
                    offset: 0,
                    size: 4,
                    nad_type: NadType::C08,
                    dims: vec![4],
                },
            ),
        )
        .unwrap();

    let spec = PortSpec::new("AFDX", PortKind::AfdxSampling, Direction::Output);
    let (socket, _wire) = RecordingSocket::output(41_009);
    let port = context.add_port(&spec, socket).unwrap();
    let status = context
        .register(
            port,
            "STATUS",
            MessageSpec::new("STATUS", MessageShape::AfdxSampling { size: 2, init: None }),
        )
        .unwrap();

    context.push_queuing(route, &[1, 1]).unwrap();
    context.write_nad(block, &[1, 2, 3, 4]).unwrap();
    context.write_sampling(status, &[5, 6]).unwrap();

    context.invalidate_all();

    let reading = context.message(status).unwrap().read(context.time_us()).unwrap();
    assert_eq!(reading.validity, Validity::Invalid);
    assert_eq!(reading.data, vec![5, 6]);
    assert_eq!(
        context.message(block).unwrap().read(0).unwrap().validity,
        Validity::Valid
    );
    assert_eq!(context.queuing_pending(route).unwrap(), 1);
}

#[test]
fn test_reset_all_makes_periodic_ports_due_again() {
    let mut context = context();
    let spec = PortSpec::new("ADC", PortKind::Analogue, Direction::Output)
        .with_payload_size(4)
        .with_period_us(2 * PERIOD_US);
    let (socket, wire) = RecordingSocket::output(41_010);
    let port = context.add_port(&spec, socket).unwrap();
    context
        .register(port, "SPEED", MessageSpec::new("SPEED", analogue(0, 1.0, 0.0)))
        .unwrap();

    context.progress(10 * PERIOD_US).unwrap();
    assert_eq!(context.send_all().unwrap(), 1);
    assert_eq!(context.send_all().unwrap(), 0);

    context.reset_all();
    assert_eq!(context.time_us(), 0);
    assert_eq!(context.send_all().unwrap(), 1);
    assert_eq!(context.send_all().unwrap(), 0);
    assert_eq!(wire.lock().sent.len(), 2);
}
