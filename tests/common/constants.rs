//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When test data changes (user credentials, image names, etc.),
//! update only this file.

#![allow(dead_code)]

// ============================================================================
// Test User Credentials
// ============================================================================

/// Test user owning most of the seeded images
pub const TEST_USER: &str = "testuser";

/// Test user password
pub const TEST_PASS: &str = "testpass123";

/// Second test user, owner of a single seeded image
pub const OTHER_USER: &str = "otheruser";

/// Second test user password
pub const OTHER_PASS: &str = "otherpass123";

// ============================================================================
// Seeded Images
// ============================================================================

/// Owned by TEST_USER
pub const SUNSET_IMAGE_NAME: &str = "Sunset over the lake";

/// Owned by TEST_USER
pub const MOUNTAIN_IMAGE_NAME: &str = "Mountain SUNRISE";

/// Owned by OTHER_USER
pub const CITY_IMAGE_NAME: &str = "City at night";

/// References an author that does not exist
pub const ORPHAN_IMAGE_NAME: &str = "Forgotten 100% cotton";

/// Author id of the orphan image
pub const ORPHAN_AUTHOR_ID: usize = 999;

/// Total number of seeded images
pub const SEEDED_IMAGES_COUNT: usize = 4;

/// Username shown for images without author
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// A well formed id that matches no image
pub const MISSING_IMAGE_ID: &str = "00000000-0000-4000-8000-000000000000";

// ============================================================================
// Uploads
// ============================================================================

/// Upload limit of the test server, in bytes
pub const TEST_MAX_UPLOAD_BYTES: usize = 4096;

/// PNG signature followed by the start of an IHDR chunk
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00,
];

/// JPEG SOI marker followed by a JFIF APP0 segment header
pub const JPEG_BYTES: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00,
];

/// GIF header, rejected by the server
pub const GIF_BYTES: &[u8] = b"GIF89a\x01\x00\x01\x00\x00\x00\x00";

// ============================================================================
// Timeouts
// ============================================================================

/// Server startup timeout in milliseconds
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Server ready check interval in milliseconds
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Default request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
