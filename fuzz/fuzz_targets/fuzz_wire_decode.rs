//! Fuzz target: backend response decoding
//!
//! Feeds arbitrary bytes to every response decoder the agent uses and
//! checks that:
//! - Decoding never panics, only returns `Transport(Decode)`
//! - A decoded `CommandOffer` re-encodes to JSON that decodes identically
//! - `FirmwarePayload::candidate` never yields an empty artifact
//!
//! cargo fuzz run fuzz_wire_decode

#![no_main]

use doorlink::adapters::http::decode_body;
use doorlink::error::{Error, TransportError};
use doorlink::protocol::{ArtifactKind, CommandOffer, FirmwarePayload, StatusReply};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match decode_body::<CommandOffer>(data) {
        Ok(offer) => {
            let json = serde_json::to_vec(&offer).expect("offer serialises");
            let again: CommandOffer = decode_body(&json).expect("re-encoded offer decodes");
            assert_eq!(offer, again);
        }
        Err(e) => assert_eq!(e, Error::Transport(TransportError::Decode)),
    }

    if let Ok(payload) = decode_body::<FirmwarePayload>(data) {
        for kind in ArtifactKind::ALL {
            if let Some(candidate) = payload.candidate(kind) {
                assert!(!candidate.content.is_empty());
                assert!(!candidate.version.is_empty());
            }
        }
    }

    let _ = decode_body::<StatusReply>(data);
});
