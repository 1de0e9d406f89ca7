extern crate std;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use quickcheck::{Arbitrary, Gen, quickcheck};

use crate::EXTENSIONS;
use crate::name::{BASENAME_LEN, decode, encode, extension_type};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// A basename drawn from the accepted alphabet, 1..=8 characters.
#[derive(Clone, Debug)]
struct Basename(String);

impl Arbitrary for Basename {
    fn arbitrary(g: &mut Gen) -> Self {
        let len = (usize::arbitrary(g) % BASENAME_LEN) + 1;
        let s: String = (0..len)
            .map(|_| *g.choose(ALPHABET).unwrap() as char)
            .collect();
        Basename(s)
    }
}

/// An extension from the configured table.
#[derive(Clone, Debug)]
struct KnownExtension(&'static str);

impl Arbitrary for KnownExtension {
    fn arbitrary(g: &mut Gen) -> Self {
        KnownExtension(g.choose(EXTENSIONS).copied().unwrap())
    }
}

fn right_justified(basename: &str) -> [u8; BASENAME_LEN] {
    let mut field = [b'_'; BASENAME_LEN];
    field[BASENAME_LEN - basename.len()..].copy_from_slice(basename.as_bytes());
    field
}

quickcheck! {
    fn roundtrip(basename: Basename, ext: KnownExtension) -> bool {
        let (encoded, _) = encode(&format!("{}.{}", basename.0, ext.0)).unwrap();
        decode(&encoded) == right_justified(&basename.0)
    }

    fn type_id_is_table_index_plus_one(basename: Basename, ext: KnownExtension) -> bool {
        let (_, ty) = encode(&format!("{}.{}", basename.0, ext.0)).unwrap();
        ty as usize == EXTENSIONS.iter().position(|&e| e == ext.0).unwrap() + 1
    }

    fn distinct_padded_basenames_encode_differently(a: Basename, b: Basename) -> bool {
        let (ea, _) = encode(&format!("{}.bin", a.0)).unwrap();
        let (eb, _) = encode(&format!("{}.bin", b.0)).unwrap();
        (right_justified(&a.0) == right_justified(&b.0)) == (ea == eb)
    }

    fn decode_always_yields_alphabet_characters(raw: Vec<u8>) -> bool {
        if raw.len() < 6 {
            return true;
        }
        let encoded = [raw[0], raw[1], raw[2], raw[3], raw[4], raw[5]];
        decode(&encoded).iter().all(|c| ALPHABET.contains(c))
    }

    fn extension_comparison_stops_at_three_characters(ext: KnownExtension) -> bool {
        let long = format!("{}extra", ext.0);
        extension_type(&long) == extension_type(ext.0)
    }
}
