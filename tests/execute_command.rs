//! Full request/response exchange of `uavcan.node.ExecuteCommand.1.0`
//! between a client (node 13) and a server (node 27), checked byte for byte.

use cyphal_can::dsdl::uavcan::node::execute_command_1_0::{Request, Response, Status};
use cyphal_can::session::StaticSessionManager;
use cyphal_can::time::ManualClock;
use cyphal_can::transport::can::{CanFrame, CanMetadata};
use cyphal_can::{Node, NodeConfig, Priority, TransferKind};

type TestNode =
    Node<StaticSessionManager<CanMetadata, ManualClock, 4, 4, 128>, ManualClock, 16, 4, 4>;

const REQUEST_ID: u32 = 0x136C_CD8D;
const RESPONSE_ID: u32 = 0x126C_C69B;

const ESPRESSO_FRAMES: [&[u8]; 6] = [
    &[0xFE, 0xCA, 0x23, 0x49, 0x20, 0x77, 0x61, 0xA0],
    &[0x6E, 0x74, 0x20, 0x61, 0x20, 0x64, 0x6F, 0x00],
    &[0x75, 0x62, 0x6C, 0x65, 0x20, 0x65, 0x73, 0x20],
    &[0x70, 0x72, 0x65, 0x73, 0x73, 0x6F, 0x20, 0x00],
    &[0x77, 0x69, 0x74, 0x68, 0x20, 0x63, 0x72, 0x20],
    &[0x65, 0x61, 0x6D, 0xC4, 0xC8, 0x40],
];

const NO_COFFEE_FRAMES: [&[u8]; 5] = [
    &[0xAD, 0xDE, 0x1C, 0x49, 0x20, 0x64, 0x6F, 0xA1],
    &[0x20, 0x6E, 0x6F, 0x74, 0x20, 0x6E, 0x65, 0x01],
    &[0x65, 0x64, 0x20, 0x63, 0x6F, 0x66, 0x66, 0x21],
    &[0x65, 0x65, 0x20, 0x61, 0x6E, 0x79, 0x6D, 0x01],
    &[0x6F, 0x72, 0x65, 0x51, 0x31, 0x61],
];

const NOT_AUTHORIZED: [u8; 8] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xE0];
const BAD_STATE: [u8; 8] = [0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xE1];

fn node(id: u16) -> TestNode {
    Node::new(
        Some(id),
        ManualClock::new(),
        StaticSessionManager::new(),
        NodeConfig::default(),
    )
}

fn frame(id: u32, data: &[u8]) -> CanFrame<ManualClock> {
    CanFrame::new(ManualClock::instant(0), id, data).unwrap()
}

fn drain(node: &mut TestNode) -> Vec<CanFrame<ManualClock>> {
    let mut frames = Vec::new();
    while let Some(frame) = node.pop_frame() {
        frames.push(frame);
    }
    frames
}

fn assert_frames(frames: &[CanFrame<ManualClock>], id: u32, expected: &[&[u8]]) {
    assert_eq!(frames.len(), expected.len());
    for (frame, data) in frames.iter().zip(expected) {
        assert_eq!(frame.id.as_raw(), id);
        assert_eq!(frame.payload.as_slice(), *data);
    }
}

#[test]
fn client_requests_match_reference() {
    let mut client = node(13);

    let espresso = Request::new(0xCAFE, b"I want a double espresso with cream").unwrap();
    let first = client.request(27, &espresso, None).unwrap();
    assert_eq!(first.key().transfer_id, 0);
    assert_frames(&drain(&mut client), REQUEST_ID, &ESPRESSO_FRAMES);

    let no_coffee = Request::new(0xDEAD, b"I do not need coffee anymore").unwrap();
    let second = client.request(27, &no_coffee, None).unwrap();
    assert_eq!(second.key().transfer_id, 1);
    assert_frames(&drain(&mut client), REQUEST_ID, &NO_COFFEE_FRAMES);

    assert!(client.take_response(&first).unwrap().is_none());

    assert!(client.receive_frame(&frame(RESPONSE_ID, &NOT_AUTHORIZED)).is_none());
    assert!(client.receive_frame(&frame(RESPONSE_ID, &BAD_STATE)).is_none());

    assert_eq!(
        client.take_response(&first).unwrap(),
        Some(Response {
            status: Status::NotAuthorized
        })
    );
    assert_eq!(
        client.take_response(&second).unwrap(),
        Some(Response {
            status: Status::BadState
        })
    );
    assert_eq!(client.diagnostics().unmatched_responses, 0);
}

#[test]
fn server_answers_reference_requests() {
    let mut server = node(27);
    server.subscribe_requests::<Request>().unwrap();

    let replies = [
        (&ESPRESSO_FRAMES[..], Status::NotAuthorized, NOT_AUTHORIZED),
        (&NO_COFFEE_FRAMES[..], Status::BadState, BAD_STATE),
    ];

    for (frames, status, expected) in replies {
        let frames: Vec<_> = frames.iter().map(|data| frame(REQUEST_ID, data)).collect();
        let (last, rest) = frames.split_last().unwrap();
        for frame in rest {
            assert!(server.receive_frame(frame).is_none());
        }

        let transfer = server.receive_frame(last).unwrap();
        assert_eq!(transfer.metadata.transfer_kind, TransferKind::Request);
        assert_eq!(transfer.metadata.remote_node_id, Some(13));
        assert_eq!(transfer.metadata.priority, Priority::Nominal);
        let request: Request = transfer.decode().unwrap();
        assert!(request.command == 0xCAFE || request.command == 0xDEAD);

        let metadata = transfer.metadata;
        server.respond(&metadata, &Response { status }).unwrap();

        let reply = drain(&mut server);
        assert_frames(&reply, RESPONSE_ID, &[&expected[..]]);
    }

    assert_eq!(server.diagnostics().transfers_received, 2);
    assert_eq!(server.diagnostics().transfers_sent, 2);
}

#[test]
fn client_and_server_talk() {
    let mut client = node(13);
    let mut server = node(27);
    server.subscribe_requests::<Request>().unwrap();

    let request = Request::new(Request::COMMAND_RESTART, b"now").unwrap();
    let handle = client.request(27, &request, None).unwrap();

    let mut metadata = None;
    for frame in drain(&mut client) {
        if let Some(transfer) = server.receive_frame(&frame) {
            assert_eq!(transfer.decode::<Request>().unwrap(), request);
            metadata = Some(transfer.metadata);
        }
    }
    server
        .respond(
            &metadata.unwrap(),
            &Response {
                status: Status::Success,
            },
        )
        .unwrap();

    for frame in drain(&mut server) {
        assert!(client.receive_frame(&frame).is_none());
    }
    assert_eq!(
        client.take_response(&handle).unwrap(),
        Some(Response {
            status: Status::Success
        })
    );
}

#[test]
fn response_for_unknown_request_counted() {
    let mut client = node(13);
    let request = Request::new(0xCAFE, b"").unwrap();
    client.request(27, &request, None).unwrap();

    // Transfer-ID 1 was never requested
    assert!(client.receive_frame(&frame(RESPONSE_ID, &BAD_STATE)).is_none());
    assert_eq!(client.diagnostics().unmatched_responses, 1);
}
