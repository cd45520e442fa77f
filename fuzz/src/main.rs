//! AFL harness for the envelope decoder.
//!
//! Every input must decode to an envelope or a `WireError`; a panic is a
//! crash. Decoded envelopes are re-encoded to exercise the encoder on
//! whatever shapes the decoder accepts.

use std::io::{self, Read};

use render_stream::wire::{MAX_FRAME_LEN, decode, encode};

unsafe extern "C" {
    fn __AFL_LOOP(cnt: u32) -> i32;
}

fn main() {
    // One frame beyond the limit is enough to reach the oversize check.
    let limit = MAX_FRAME_LEN.saturating_add(1);
    let mut data = Vec::with_capacity(limit);
    loop {
        // SAFETY: provided by the AFL runtime linked in by `cargo afl build`.
        if unsafe { __AFL_LOOP(1000) } == 0 {
            break;
        }
        data.clear();
        if io::stdin()
            .take(u64::try_from(limit).unwrap_or(u64::MAX))
            .read_to_end(&mut data)
            .is_err()
        {
            return;
        }

        if let Ok(envelope) = decode(&data) {
            encode(&envelope).ok();
        }
    }
}
