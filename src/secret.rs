//! Secrets associated with archived SFO Museum Instagram photos.
//!
//! Legacy media files are stored as `{media_id}_{secret}_o.jpg`, where the
//! secret is derived from the media ID alone.

use md5::{Digest, Md5};

const SECRET_LENGTH: usize = 10;

/// Derive the secret for `id`: the first ten hex characters of the MD5
/// digest of the reversed ID.
pub fn derive_secret(id: &str) -> String {
    let reversed: String = id.chars().rev().collect();
    let digest = format!("{:x}", Md5::digest(reversed.as_bytes()));
    digest[..SECRET_LENGTH].to_string()
}

/// File name of the original-size image for a media ID.
pub fn original_image_name(media_id: &str) -> String {
    format!("{}_{}_o.jpg", media_id, derive_secret(media_id))
}

/// Bucket-relative path of the original-size image: `{media_id}/{media_id}_{secret}_o.jpg`.
pub fn original_image_path(media_id: &str) -> String {
    format!("{}/{}", media_id, original_image_name(media_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_secret() {
        let tests = [
            ("7784f12fc1c2315991c8afd2542fbc09", "7bc63e2e17"),
            ("1992bc804396919a739d5dc8ce473195", "a408cca3d9"),
        ];

        for (input, expected) in tests {
            assert_eq!(derive_secret(input), expected, "secret for {}", input);
        }
    }

    #[test]
    fn test_original_image_path() {
        assert_eq!(
            original_image_path("7784f12fc1c2315991c8afd2542fbc09"),
            "7784f12fc1c2315991c8afd2542fbc09/7784f12fc1c2315991c8afd2542fbc09_7bc63e2e17_o.jpg"
        );
    }
}
