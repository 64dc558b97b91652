//! End-to-end engine scenarios over synthetic portrait uploads.
//!
//! Portraits are stylized but detector-realistic: a bright face disc on
//! a dark background with a darker eye band and mouth. The engine runs
//! without the learned detector, exercising the geometric fallback
//! stages the way a degraded deployment would.

use std::io::Cursor;

use image::{Rgb, RgbImage};
use veriface_core::engine::Engine;
use veriface_core::error::EngineError;
use veriface_core::store::EmbeddingStore;
use veriface_core::types::VerifyOutcome;
use veriface_core::EngineConfig;

const BG: u8 = 26;
const SKIN: u8 = 205;

struct FaceStyle {
    eye_band: (f32, f32),
    eye_value: u8,
    mouth_band: (f32, f32),
    mouth_value: u8,
}

impl FaceStyle {
    fn alice() -> Self {
        Self {
            eye_band: (0.28, 0.38),
            eye_value: 110,
            mouth_band: (0.70, 0.78),
            mouth_value: 120,
        }
    }

    /// Visually distinct from `alice`: shifted features, darker
    /// markings, extra brow band.
    fn bob() -> Self {
        Self {
            eye_band: (0.25, 0.33),
            eye_value: 70,
            mouth_band: (0.62, 0.78),
            mouth_value: 60,
        }
    }
}

fn portrait(w: u32, h: u32, fx: u32, fy: u32, fs: u32, style: &FaceStyle) -> RgbImage {
    let mut img = RgbImage::from_pixel(w, h, Rgb([BG, BG, BG]));
    let r = fs as f32 / 2.0;
    let (cx, cy) = (fx as f32 + r, fy as f32 + r);
    for y in fy..(fy + fs).min(h) {
        for x in fx..(fx + fs).min(w) {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            if dx * dx + dy * dy <= r * r {
                img.put_pixel(x, y, Rgb([SKIN, SKIN, SKIN]));
            }
        }
    }
    let mut band = |y0f: f32, y1f: f32, x0f: f32, x1f: f32, v: u8| {
        for y in fy + (fs as f32 * y0f) as u32..fy + (fs as f32 * y1f) as u32 {
            for x in fx + (fs as f32 * x0f) as u32..fx + (fs as f32 * x1f) as u32 {
                if x < w && y < h {
                    img.put_pixel(x, y, Rgb([v, v, v]));
                }
            }
        }
    };
    band(
        style.eye_band.0,
        style.eye_band.1,
        0.18,
        0.82,
        style.eye_value,
    );
    band(
        style.mouth_band.0,
        style.mouth_band.1,
        0.30,
        0.70,
        style.mouth_value,
    );
    img
}

fn png_bytes(img: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn engine() -> Engine {
    Engine::new(
        EngineConfig::default(),
        EmbeddingStore::open_in_memory().unwrap(),
        None,
    )
}

fn alice_photo() -> Vec<u8> {
    png_bytes(&portrait(240, 240, 60, 60, 120, &FaceStyle::alice()))
}

fn bob_photo() -> Vec<u8> {
    png_bytes(&portrait(240, 240, 40, 30, 150, &FaceStyle::bob()))
}

#[test]
fn enroll_then_verify_same_photo_matches_near_one() {
    let engine = engine();
    let photo = alice_photo();

    let outcome = engine.enroll("alice", &photo, "image/png").unwrap();
    assert!(!outcome.was_update);

    match engine.verify(&photo, "image/png").unwrap() {
        VerifyOutcome::Verified {
            identity_key,
            similarity,
        } => {
            assert_eq!(identity_key, "alice");
            assert!(similarity > 0.99, "similarity {similarity}");
        }
        other => panic!("expected verification, got {other:?}"),
    }
}

#[test]
fn distinct_identities_never_cross_match() {
    let engine = engine();
    engine.enroll("alice", &alice_photo(), "image/png").unwrap();
    engine.enroll("bob", &bob_photo(), "image/png").unwrap();

    match engine.verify(&bob_photo(), "image/png").unwrap() {
        VerifyOutcome::Verified { identity_key, .. } => assert_eq!(identity_key, "bob"),
        other => panic!("expected bob to verify, got {other:?}"),
    }
    match engine.verify(&alice_photo(), "image/png").unwrap() {
        VerifyOutcome::Verified { identity_key, .. } => assert_eq!(identity_key, "alice"),
        other => panic!("expected alice to verify, got {other:?}"),
    }
}

#[test]
fn faceless_image_is_rejected_as_not_detected() {
    let engine = engine();
    engine.enroll("alice", &alice_photo(), "image/png").unwrap();

    let blank = png_bytes(&RgbImage::from_pixel(240, 240, Rgb([120, 120, 120])));
    assert!(matches!(
        engine.verify(&blank, "image/png"),
        Err(EngineError::FaceNotDetected)
    ));
}

#[test]
fn verify_against_empty_store_is_no_match_without_best() {
    let engine = engine();
    match engine.verify(&alice_photo(), "image/png").unwrap() {
        VerifyOutcome::NoMatch { best_similarity } => assert!(best_similarity.is_none()),
        other => panic!("expected NoMatch, got {other:?}"),
    }
}

#[test]
fn oversized_upload_short_circuits_the_pipeline() {
    let config = EngineConfig {
        max_upload_bytes: 64,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config, EmbeddingStore::open_in_memory().unwrap(), None);

    // Garbage bytes over the limit: the size check must fire before
    // any decode attempt could report corruption.
    let err = engine.verify(&vec![0u8; 256], "image/png").unwrap_err();
    assert!(matches!(err, EngineError::OversizedInput { actual: 256, .. }));
}

#[test]
fn unsupported_and_corrupt_uploads_report_their_stage() {
    let engine = engine();
    assert!(matches!(
        engine.verify(&alice_photo(), "image/tiff"),
        Err(EngineError::UnsupportedFormat(_))
    ));
    assert!(matches!(
        engine.verify(b"not a png at all", "image/png"),
        Err(EngineError::CorruptImage { .. })
    ));
}

#[test]
fn reenrollment_replaces_the_single_record() {
    let engine = engine();
    let first = alice_photo();
    // Same identity, new photo (different framing).
    let second = png_bytes(&portrait(240, 240, 70, 50, 130, &FaceStyle::alice()));

    assert!(!engine.enroll("alice", &first, "image/png").unwrap().was_update);
    let outcome = engine.enroll("alice", &second, "image/png").unwrap();
    assert!(outcome.was_update);

    let records = engine.list().unwrap();
    assert_eq!(records.len(), 1, "one embedding per identity key");
    assert_eq!(records[0].source_ref, outcome.source_ref);

    // The stored vector is the most recent enrollment's output.
    match engine.verify(&second, "image/png").unwrap() {
        VerifyOutcome::Verified { similarity, .. } => {
            assert!(similarity > 0.99, "similarity {similarity}")
        }
        other => panic!("expected verification, got {other:?}"),
    }
}

#[test]
fn remove_forgets_the_identity() {
    let engine = engine();
    let photo = alice_photo();
    engine.enroll("alice", &photo, "image/png").unwrap();
    assert!(engine.remove("alice").unwrap());
    assert!(!engine.remove("alice").unwrap());

    match engine.verify(&photo, "image/png").unwrap() {
        VerifyOutcome::NoMatch { best_similarity } => assert!(best_similarity.is_none()),
        other => panic!("expected NoMatch after removal, got {other:?}"),
    }
}
