//! Clone names and access paths.

use crate::path;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Logical clone name: the explicit name, else the parent image's file stem.
///
/// The attached database uses the same name.
pub fn clone_name(explicit: Option<&str>, image_location: &str) -> String {
    match explicit {
        Some(name) => name.trim().to_string(),
        None => path::file_stem(image_location).to_string(),
    }
}

/// Random lowercase alphanumeric suffix of `len` characters.
pub fn random_suffix<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| (rng.sample(Alphanumeric) as char).to_ascii_lowercase())
        .collect()
}

/// Directory the clone's disk is mounted at.
///
/// Generated names get a random suffix so repeated clones of one image do
/// not share an access path; an explicit name is used as-is.
pub fn access_path<R: Rng + ?Sized>(
    destination: &str,
    clone_name: &str,
    explicit_name: bool,
    rng: &mut R,
    suffix_length: usize,
) -> String {
    if explicit_name || suffix_length == 0 {
        path::join(destination, clone_name)
    } else {
        let folder = format!("{}_{}", clone_name, random_suffix(rng, suffix_length));
        path::join(destination, &folder)
    }
}
