//! Group an Annex-B elementary stream into postable frames.

use fleet_core::video::{nal_unit_type, split_annex_b};

const NAL_SLICE: u8 = 1;
const NAL_IDR: u8 = 5;

/// Split a stream into access units: parameter sets and SEI are carried with
/// the next coded slice so every posted frame is decodable on its own terms.
pub fn access_units(stream: &[u8]) -> Vec<Vec<u8>> {
    let mut units = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    for nal in split_annex_b(stream) {
        pending.extend_from_slice(nal);
        if matches!(nal_unit_type(nal), Some(NAL_SLICE | NAL_IDR)) {
            units.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        units.push(pending);
    }
    units
}
