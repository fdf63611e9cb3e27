// Simulated XBee module for `--mock` runs.
//
// Watches what the session writes to a MockTransport and answers every
// correlated request with a success response, the way a healthy module
// with one reachable neighbour would.

use std::time::Duration;

use xbeelib::{ApiFrame, ApiMode, AtCommand, AtStatus};
use xbeelib_api::codec::{FrameDecoder, encode_frame};
use xbeelib_test_harness::MockHandle;

/// Address the simulated neighbour reports for any `DN` lookup.
const NEIGHBOUR64: u64 = 0x0013_A200_4000_0001;
const NEIGHBOUR16: u16 = 0x1234;

/// Node identifier of the simulated local module.
const LOCAL_NI: &[u8] = b"MOCK";

/// Spawn a task answering requests written to `handle`.
pub fn spawn_mock_module(handle: MockHandle, mode: ApiMode) {
    tokio::spawn(async move {
        let mut decoder = FrameDecoder::new(mode);
        let mut seen = 0;
        loop {
            let Some(sent) = handle.wait_for_sent(seen + 1, Duration::from_secs(3600)).await else {
                continue;
            };
            for bytes in &sent[seen..] {
                decoder.push(bytes);
            }
            seen = sent.len();

            while let Some(request) = decoder.next_frame() {
                if let Some(response) = respond(request) {
                    tracing::trace!(frame_type = response.frame_type(), "mock module reply");
                    handle.inject(&encode_frame(&response, mode));
                }
            }
        }
    });
}

/// The response a healthy module gives, or `None` for frame ID 0.
fn respond(request: ApiFrame) -> Option<ApiFrame> {
    match request {
        ApiFrame::AtCommand {
            frame_id, command, ..
        }
        | ApiFrame::AtCommandQueue {
            frame_id, command, ..
        } if frame_id != 0 => Some(ApiFrame::AtCommandResponse {
            frame_id,
            command,
            status: AtStatus::Ok,
            data: local_value(command),
        }),
        ApiFrame::RemoteAtCommand {
            frame_id,
            destination64,
            destination16,
            command,
            parameter,
            ..
        } if frame_id != 0 => Some(ApiFrame::RemoteAtCommandResponse {
            frame_id,
            source64: destination64,
            source16: destination16,
            command,
            status: AtStatus::Ok,
            data: if parameter.is_empty() { vec![0x00] } else { Vec::new() },
        }),
        ApiFrame::TransmitRequest { frame_id, .. } if frame_id != 0 => {
            Some(ApiFrame::TransmitStatus {
                frame_id,
                destination16: NEIGHBOUR16,
                retry_count: 0,
                delivery_status: 0,
                discovery_status: 0,
            })
        }
        ApiFrame::TxRequest64 { frame_id, .. } | ApiFrame::TxRequest16 { frame_id, .. }
            if frame_id != 0 =>
        {
            Some(ApiFrame::TxStatus {
                frame_id,
                status: 0,
            })
        }
        _ => None,
    }
}

fn local_value(command: AtCommand) -> Vec<u8> {
    match &command.as_bytes() {
        b"NI" => LOCAL_NI.to_vec(),
        b"DN" => {
            let mut data = NEIGHBOUR16.to_be_bytes().to_vec();
            data.extend_from_slice(&NEIGHBOUR64.to_be_bytes());
            data
        }
        b"AP" => vec![0x01],
        _ => Vec::new(),
    }
}
