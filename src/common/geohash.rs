//! Geohash encoding and proximity scoring
//!
//! - Base-32 geohash of a (lat, lon) pair by interleaved bisection
//! - Shared-prefix length as a distance surrogate between two geohashes
//! - Unique cargo identities (`<geohash>-<uuid>`)

use uuid::Uuid;

/// Default geohash precision (characters). 12 chars resolve to a few centimetres.
pub const DEFAULT_PRECISION: usize = 12;

/// Longest geohash we produce; 12 characters already exceed f64 resolution needs.
pub const MAX_PRECISION: usize = 12;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Separator between the geohash prefix and the unique suffix of a cargo id
pub const ID_SEPARATOR: char = '-';

/// Is (lat, lon) a finite point inside the valid coordinate ranges?
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Encode a coordinate as a geohash of `precision` characters.
///
/// Callers validate the coordinate first; out-of-range input still produces a
/// string (clamped to the nearest edge cell) rather than panicking.
pub fn encode(lat: f64, lon: f64, precision: usize) -> String {
    let precision = precision.clamp(1, MAX_PRECISION);
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);

    let mut hash = String::with_capacity(precision);
    let mut even_bit = true;
    let mut bit = 0;
    let mut idx = 0usize;

    while hash.len() < precision {
        let (range, value) = if even_bit {
            (&mut lon_range, lon)
        } else {
            (&mut lat_range, lat)
        };
        let mid = (range.0 + range.1) / 2.0;
        if value >= mid {
            idx = (idx << 1) | 1;
            range.0 = mid;
        } else {
            idx <<= 1;
            range.1 = mid;
        }
        even_bit = !even_bit;

        bit += 1;
        if bit == 5 {
            hash.push(BASE32[idx] as char);
            bit = 0;
            idx = 0;
        }
    }

    hash
}

/// Length of the common leading run of two geohashes (case-sensitive).
pub fn shared_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

/// Build a globally unique cargo identity from its geohash.
pub fn cargo_id(geohash: &str) -> String {
    format!("{}{}{}", geohash, ID_SEPARATOR, Uuid::new_v4())
}
