//! End-to-end convolution engine tests.
//!
//! Verifies:
//! - Overlap-save correctness against a direct-form reference
//! - Linearity and time invariance
//! - Block-size invariance (B1 vs B2, same filter and stream)
//! - FFT-size invariance (N > 2B discards only the tail)
//! - FDL ring wrap over more than K blocks
//! - Idempotent construction (bit-for-bit identical filter tables)

use fdconv::{Engine, EngineConfig};

fn pseudo_random(seed: usize, len: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    (0..len)
        .map(|i| {
            let mut hasher = DefaultHasher::new();
            (seed, i).hash(&mut hasher);
            let h = hasher.finish();
            (h as f64 / u64::MAX as f64) as f32 * 2.0 - 1.0
        })
        .collect()
}

fn direct_form_convolve(filter: &[f32], input: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0f32; input.len() + filter.len() - 1];
    for (i, &x) in input.iter().enumerate() {
        for (j, &h) in filter.iter().enumerate() {
            out[i + j] += x * h;
        }
    }
    out
}

fn rel_close(a: f32, b: f32) -> bool {
    (a - b).abs() / b.abs().max(1.0) <= 1e-4
}

fn run_blocks(engine: &mut Engine, input: &[f32], block: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(input.len());
    for chunk in input.chunks(block) {
        out.extend_from_slice(engine.convolve(chunk).unwrap());
    }
    out
}

#[test]
fn s5_larger_fft_size_discards_only_tail() {
    let filter = vec![pseudo_random(1, 10)];
    let block = 4;

    let mut baseline = Engine::new(&filter, EngineConfig::new(block)).unwrap();
    let mut wider = Engine::new(&filter, EngineConfig::new(block).with_fft_size(4 * block)).unwrap();

    let input = pseudo_random(2, 64);
    let out_baseline = run_blocks(&mut baseline, &input, block);
    let out_wider = run_blocks(&mut wider, &input, block);

    // both configurations converge once the longer window has filled.
    let warmup = 2 * block;
    for (a, b) in out_baseline[warmup..].iter().zip(&out_wider[warmup..]) {
        assert!(rel_close(*a, *b), "{a} !~= {b}");
    }
}

#[test]
fn s6_ring_wrap_matches_direct_form_reference() {
    let filter = pseudo_random(10, 12);
    let block = 4; // K = 3 partitions
    let mut engine = Engine::new(&[filter.clone()], EngineConfig::new(block)).unwrap();

    let input = pseudo_random(11, block * 10); // 10 blocks, wraps the K=3 ring more than 3x
    let reference = direct_form_convolve(&filter, &input);
    let got = run_blocks(&mut engine, &input, block);

    for (i, (&a, &b)) in got.iter().zip(&reference[..got.len()]).enumerate() {
        assert!(rel_close(a, b), "sample {i}: {a} !~= {b}");
    }
}

#[test]
fn linearity_holds_across_two_streams() {
    let filter = pseudo_random(20, 9);
    let block = 3;
    let a = pseudo_random(21, block * 6);
    let b = pseudo_random(22, block * 6);
    let alpha = 0.7f32;
    let beta = -1.3f32;
    let combined: Vec<f32> = a.iter().zip(&b).map(|(x, y)| alpha * x + beta * y).collect();

    let mut engine_a = Engine::new(&[filter.clone()], EngineConfig::new(block)).unwrap();
    let mut engine_b = Engine::new(&[filter.clone()], EngineConfig::new(block)).unwrap();
    let mut engine_combined = Engine::new(&[filter], EngineConfig::new(block)).unwrap();

    let out_a = run_blocks(&mut engine_a, &a, block);
    let out_b = run_blocks(&mut engine_b, &b, block);
    let out_combined = run_blocks(&mut engine_combined, &combined, block);

    for i in 0..out_combined.len() {
        let expected = alpha * out_a[i] + beta * out_b[i];
        assert!(rel_close(out_combined[i], expected), "sample {i}: {} !~= {expected}", out_combined[i]);
    }
}

#[test]
fn time_invariance_shifts_output_by_one_block() {
    let filter = pseudo_random(30, 7);
    let block = 4;
    let stream = pseudo_random(31, block * 8);
    let mut delayed = vec![0.0f32; block];
    delayed.extend_from_slice(&stream);

    let mut engine = Engine::new(&[filter.clone()], EngineConfig::new(block)).unwrap();
    let out = run_blocks(&mut engine, &stream, block);

    let mut engine_delayed = Engine::new(&[filter], EngineConfig::new(block)).unwrap();
    let out_delayed = run_blocks(&mut engine_delayed, &delayed, block);

    for (a, b) in out.iter().zip(&out_delayed[block..]) {
        assert!(rel_close(*a, *b));
    }
}

#[test]
fn block_size_invariance() {
    let filter = pseudo_random(40, 24);
    let stream = pseudo_random(41, 96);

    let mut engine_b1 = Engine::new(&[filter.clone()], EngineConfig::new(4)).unwrap();
    let mut engine_b2 = Engine::new(&[filter], EngineConfig::new(8)).unwrap();

    let out_b1 = run_blocks(&mut engine_b1, &stream, 4);
    let out_b2 = run_blocks(&mut engine_b2, &stream, 8);

    for (a, b) in out_b1.iter().zip(&out_b2) {
        assert!(rel_close(*a, *b));
    }
}

#[test]
fn idempotent_construction_yields_identical_tables() {
    let filter = vec![pseudo_random(50, 17)];
    let engine_a = Engine::new(&filter, EngineConfig::new(4)).unwrap();
    let engine_b = Engine::new(&filter, EngineConfig::new(4)).unwrap();
    assert_eq!(engine_a.num_partitions(), engine_b.num_partitions());

    // same filter and parameters must drive bit-for-bit identical output
    // given the same input, since the filter table is deterministic.
    let mut a = engine_a;
    let mut b = engine_b;
    let input = pseudo_random(51, 16);
    let out_a = run_blocks(&mut a, &input, 4);
    let out_b = run_blocks(&mut b, &input, 4);
    assert_eq!(out_a, out_b);
}
