use embedded_hal::blocking::can;
use embedded_hal::can::{Error, ErrorKind, Frame, Id};

use cyphal_can::diagnostics::Diagnostics;
use cyphal_can::dsdl::uavcan::node::execute_command_1_0::{Request, Response, Status};
use cyphal_can::dsdl::uavcan::node::heartbeat_1_0::{Health, Heartbeat, Mode};
use cyphal_can::request::ResponseError;
use cyphal_can::session::{SessionError, StaticSessionManager, SubscriptionError};
use cyphal_can::time::ManualClock;
use cyphal_can::transport::can::{CanFrame, CanMetadata};
use cyphal_can::{Node, NodeConfig, Priority, RxError, TransferKind, TxError};

type TestNode =
    Node<StaticSessionManager<CanMetadata, ManualClock, 4, 4, 128>, ManualClock, 8, 4, 4>;

fn node_with(id: Option<u16>, config: NodeConfig<ManualClock>) -> TestNode {
    Node::new(id, ManualClock::new(), StaticSessionManager::new(), config)
}

fn node(id: u16) -> TestNode {
    node_with(Some(id), NodeConfig::default())
}

fn heartbeat(uptime: u32) -> Heartbeat {
    Heartbeat {
        uptime,
        health: Health::Advisory,
        mode: Mode::Maintenance,
        vendor_specific_status_code: 0x5A,
    }
}

fn espresso() -> Request {
    Request::new(0xCAFE, b"I want a double espresso with cream").unwrap()
}

fn drain(node: &mut TestNode) -> Vec<CanFrame<ManualClock>> {
    let mut frames = Vec::new();
    while let Some(frame) = node.pop_frame() {
        frames.push(frame);
    }
    frames
}

#[test]
fn heartbeat_is_single_frame() {
    let mut node = node(42);
    assert_eq!(node.publish(&heartbeat(1000), None), Ok(0));

    let frames = drain(&mut node);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].id.as_raw(), 0x107D_552A);
    assert_eq!(
        frames[0].payload.as_slice(),
        &[0xE8, 0x03, 0x00, 0x00, 0x01, 0x02, 0x5A, 0xE0]
    );
}

#[test]
fn transfer_id_increments_per_subject() {
    let mut node = node(42);
    for expected in 0..3 {
        assert_eq!(node.publish(&heartbeat(expected as u32), None), Ok(expected));
    }
    let tails: Vec<u8> = drain(&mut node)
        .iter()
        .map(|frame| *frame.payload.last().unwrap())
        .collect();
    assert_eq!(tails, vec![0xE0, 0xE1, 0xE2]);
}

#[test]
fn publish_subscribe_round_trip() {
    let mut publisher = node(42);
    let mut subscriber = node(7);
    subscriber.subscribe_message::<Heartbeat>(None).unwrap();
    assert_eq!(
        subscriber.subscribe_message::<Heartbeat>(None),
        Err(SubscriptionError::SubscriptionExists)
    );

    publisher
        .publish(&heartbeat(77), Some(Priority::Slow))
        .unwrap();
    let frame = publisher.pop_frame().unwrap();

    let transfer = subscriber.receive_frame(&frame).unwrap();
    assert_eq!(transfer.metadata.transfer_kind, TransferKind::Message);
    assert_eq!(transfer.metadata.port_id, 7509);
    assert_eq!(transfer.metadata.remote_node_id, Some(42));
    assert_eq!(transfer.metadata.priority, Priority::Slow);
    assert_eq!(transfer.decode::<Heartbeat>(), Ok(heartbeat(77)));
}

#[test]
fn unsubscribed_messages_ignored() {
    let mut publisher = node(42);
    let mut listener = node(7);
    publisher.publish(&heartbeat(1), None).unwrap();
    let frame = publisher.pop_frame().unwrap();

    assert!(matches!(listener.try_receive_frame(&frame), Ok(None)));
    assert_eq!(listener.diagnostics().frames_received, 1);
    assert_eq!(listener.diagnostics().transfers_received, 0);
}

#[test]
fn queue_full_queues_nothing() {
    let mut client = node(13);
    client.publish(&heartbeat(1), None).unwrap();
    client.publish(&heartbeat(2), None).unwrap();
    client.publish(&heartbeat(3), None).unwrap();

    // Needs 6 frames, only 5 left
    assert_eq!(
        client.request(27, &espresso(), None).err(),
        Some(TxError::QueueFull)
    );
    assert_eq!(client.pending_frames(), 3);
    assert_eq!(client.diagnostics().queue_full, 1);

    // The transfer-ID was spent all the same
    drain(&mut client);
    let handle = client.request(27, &espresso(), None).unwrap();
    assert_eq!(handle.key().transfer_id, 1);
    assert_eq!(client.pending_frames(), 6);
}

#[test]
fn payload_limit_enforced() {
    let config = NodeConfig {
        max_payload_size: 16,
        ..NodeConfig::default()
    };
    let mut client = node_with(Some(13), config);

    assert_eq!(
        client.request(27, &espresso(), None).err(),
        Some(TxError::PayloadTooLarge)
    );
    assert_eq!(client.pending_frames(), 0);

    // Rejected before a transfer-ID was taken
    let short = Request::new(0xCAFE, b"tea").unwrap();
    assert_eq!(client.request(27, &short, None).unwrap().key().transfer_id, 0);
}

#[test]
fn corrupted_transfer_counted() {
    let mut client = node(13);
    let mut server = node(27);
    server.subscribe_requests::<Request>().unwrap();

    client.request(27, &espresso(), None).unwrap();
    let mut frames = drain(&mut client);
    frames[2].payload[0] ^= 0x01;

    let (last, rest) = frames.split_last().unwrap();
    for frame in rest {
        assert!(matches!(server.try_receive_frame(frame), Ok(None)));
    }
    assert_eq!(
        server.try_receive_frame(last).err(),
        Some(RxError::SessionError(SessionError::CrcMismatch))
    );
    assert_eq!(server.diagnostics().crc_errors, 1);
    assert_eq!(server.diagnostics().transfers_received, 0);
}

#[test]
fn malformed_frames_counted() {
    let mut node = node(27);
    let empty = CanFrame::new(ManualClock::instant(0), 0x136C_CD8D, &[]).unwrap();
    assert_eq!(node.try_receive_frame(&empty).err(), Some(RxError::FrameEmpty));
    assert!(node.receive_frame(&empty).is_none());

    // Reserved bit 23 set
    let reserved = CanFrame::new(ManualClock::instant(0), 0x10FD_552A, &[0xE0]).unwrap();
    assert_eq!(
        node.try_receive_frame(&reserved).err(),
        Some(RxError::InvalidCanId)
    );

    assert_eq!(
        *node.diagnostics(),
        Diagnostics {
            frames_received: 3,
            invalid_frames: 2,
            malformed_ids: 1,
            ..Diagnostics::default()
        }
    );
}

#[test]
fn unanswered_request_expires() {
    let config = NodeConfig {
        request_timeout: Some(ManualClock::micros(1_000)),
        ..NodeConfig::default()
    };
    let mut client = node_with(Some(13), config);
    let handle = client.request(27, &espresso(), None).unwrap();

    client.update(ManualClock::instant(500));
    assert!(client.is_pending(&handle));

    client.update(ManualClock::instant(2_000));
    assert!(!client.is_pending(&handle));
    assert_eq!(client.take_response(&handle), Err(ResponseError::Unknown));
    assert_eq!(client.diagnostics().expired_requests, 1);
}

#[test]
fn sub_second_request_timeout() {
    let config = NodeConfig {
        request_timeout: Some(ManualClock::micros(500_000)),
        ..NodeConfig::default()
    };
    let mut client = node_with(Some(13), config);
    let handle = client.request(27, &espresso(), None).unwrap();

    client.update(ManualClock::instant(500_000));
    assert!(client.is_pending(&handle));

    client.update(ManualClock::instant(900_000));
    assert!(!client.is_pending(&handle));
}

#[test]
fn requests_kept_without_timeout() {
    let mut client = node(13);
    let handle = client.request(27, &espresso(), None).unwrap();
    client.update(ManualClock::instant(u32::MAX as u64));
    assert!(client.is_pending(&handle));
    assert_eq!(client.take_response(&handle), Ok(None));
}

#[test]
fn stale_reassembly_dropped() {
    let config = NodeConfig {
        transfer_timeout: Some(ManualClock::micros(1_000)),
        ..NodeConfig::default()
    };
    let mut client = node(13);
    let mut server = node_with(Some(27), config);
    server.subscribe_requests::<Request>().unwrap();

    client.request(27, &espresso(), None).unwrap();
    let frames = drain(&mut client);
    assert!(server.receive_frame(&frames[0]).is_none());
    assert!(server.receive_frame(&frames[1]).is_none());

    server.update(ManualClock::instant(5_000));
    assert_eq!(server.diagnostics().session_timeouts, 1);

    assert_eq!(
        server.try_receive_frame(&frames[2]).err(),
        Some(RxError::SessionError(SessionError::NewSessionNoStart))
    );
}

#[test]
fn respond_needs_a_request() {
    let mut publisher = node(42);
    let mut subscriber = node(7);
    subscriber.subscribe_message::<Heartbeat>(None).unwrap();

    publisher.publish(&heartbeat(1), None).unwrap();
    let frame = publisher.pop_frame().unwrap();
    let metadata = subscriber.receive_frame(&frame).unwrap().metadata;

    assert_eq!(
        subscriber.respond(
            &metadata,
            &Response {
                status: Status::Success
            }
        ),
        Err(TxError::NotARequest)
    );
}

#[test]
fn anonymous_node_publishes_only_small_messages() {
    let mut node = node_with(None, NodeConfig::default());
    assert_eq!(node.node_id(), None);
    assert_eq!(node.publish(&heartbeat(1), None), Ok(0));
    assert_eq!(
        node.request(27, &espresso(), None).err(),
        Some(TxError::ServiceNoSourceID)
    );
}

#[derive(Debug, PartialEq)]
struct BusOff;

impl Error for BusOff {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Records transmitted frames, refusing everything after `capacity` of them.
struct MockCan {
    sent: Vec<CanFrame<ManualClock>>,
    capacity: usize,
}

impl can::Can for MockCan {
    type Frame = CanFrame<ManualClock>;
    type Error = BusOff;

    fn transmit(&mut self, frame: &Self::Frame) -> Result<(), Self::Error> {
        if self.sent.len() == self.capacity {
            return Err(BusOff);
        }
        self.sent.push(frame.clone());
        Ok(())
    }

    fn receive(&mut self) -> Result<Self::Frame, Self::Error> {
        Err(BusOff)
    }
}

#[test]
fn flush_writes_in_order() {
    let mut client = node(13);
    client.request(27, &espresso(), None).unwrap();

    let mut bus = MockCan {
        sent: Vec::new(),
        capacity: 16,
    };
    assert_eq!(client.flush(&mut bus), Ok(6));
    assert_eq!(client.pending_frames(), 0);

    assert_eq!(bus.sent.len(), 6);
    assert!(bus.sent.iter().all(|frame| frame.is_extended()));
    assert_eq!(bus.sent[0].data()[..3], [0xFE, 0xCA, 0x23]);
    assert_eq!(*bus.sent[5].data().last().unwrap(), 0x40);
}

#[test]
fn flush_stops_at_bus_error() {
    let mut client = node(13);
    client.request(27, &espresso(), None).unwrap();

    let mut bus = MockCan {
        sent: Vec::new(),
        capacity: 2,
    };
    assert_eq!(client.flush(&mut bus), Err(BusOff));
    assert_eq!(client.pending_frames(), 4);

    bus.capacity = 6;
    assert_eq!(client.flush(&mut bus), Ok(4));
    assert_eq!(bus.sent.len(), 6);
}

/// Classic frame type of a driver that only handles up to 4 data bytes.
#[derive(Debug)]
struct ShortFrame {
    id: Id,
    data: Vec<u8>,
}

impl Frame for ShortFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 4 {
            return None;
        }
        Some(Self {
            id: id.into(),
            data: data.to_vec(),
        })
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.data.len()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Default)]
struct ShortCan {
    sent: Vec<ShortFrame>,
}

impl can::Can for ShortCan {
    type Frame = ShortFrame;
    type Error = BusOff;

    fn transmit(&mut self, frame: &Self::Frame) -> Result<(), Self::Error> {
        self.sent.push(ShortFrame {
            id: frame.id,
            data: frame.data.clone(),
        });
        Ok(())
    }

    fn receive(&mut self) -> Result<Self::Frame, Self::Error> {
        Err(BusOff)
    }
}

#[test]
fn flush_counts_frames_the_driver_cannot_hold() {
    let mut client = node(13);
    let tea = Request::new(0xCAFE, b"").unwrap();
    client.request(27, &tea, None).unwrap();
    client.publish(&heartbeat(1), None).unwrap();

    let mut bus = ShortCan::default();
    // The 4-byte request fits, the 8-byte heartbeat does not
    assert_eq!(client.flush(&mut bus), Ok(1));
    assert_eq!(client.pending_frames(), 0);
    assert_eq!(bus.sent.len(), 1);
    assert_eq!(bus.sent[0].data, [0xFE, 0xCA, 0x00, 0xE0]);
    assert_eq!(client.diagnostics().unsendable_frames, 1);
}
