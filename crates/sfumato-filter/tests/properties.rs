//! End-to-end behaviour of the filtering engine through its request
//! interface.

#![allow(clippy::unwrap_used, clippy::cast_precision_loss)]

use proptest::prelude::*;
use sfumato_filter::{
    BlurFactor, FilterConfig, FilterError, FilterOp, PixelBuffer, Request, Response, Sequencer,
    engine, process_all,
};

fn init_from(buffer: &PixelBuffer) -> Request {
    Request::Init {
        pixel_bytes: buffer.as_bytes().to_vec(),
        width: buffer.width(),
        height: buffer.height(),
    }
}

fn checkerboard(width: u32, height: u32, cell: u32) -> PixelBuffer {
    PixelBuffer::from_fn(width, height, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            [0, 0, 0, 255]
        } else {
            [255, 255, 255, 255]
        }
    })
    .unwrap()
}

fn split(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::from_fn(width, height, |x, _| {
        if x < width / 2 {
            [30, 60, 90, 255]
        } else {
            [240, 220, 200, 255]
        }
    })
    .unwrap()
}

/// Variance over the red channel.
fn variance(buffer: &PixelBuffer) -> f64 {
    let values: Vec<f64> = buffer
        .as_bytes()
        .chunks_exact(4)
        .map(|px| f64::from(px[0]))
        .collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

fn outputs(responses: &[Response]) -> Vec<PixelBuffer> {
    responses
        .iter()
        .map(|r| r.as_result().unwrap().output.clone())
        .collect()
}

proptest! {
    #[test]
    fn init_accepts_exactly_width_height_4(width in 1_u32..16, height in 1_u32..16, extra in 1_usize..8) {
        let expected = (width * height * 4) as usize;

        let mut seq = Sequencer::new(FilterConfig::default());
        let ok = seq.handle(Request::Init { pixel_bytes: vec![0; expected], width, height });
        prop_assert!(ok.is_empty());

        for len in [expected - 1, expected + extra] {
            let responses = seq.handle(Request::Init { pixel_bytes: vec![1; len], width, height });
            let rejected = matches!(
                responses.as_slice(),
                [Response::Error { error: FilterError::InvalidBuffer { .. } }]
            );
            prop_assert!(rejected);
            // Prior state untouched.
            let dims = seq.image_state().dimensions().unwrap();
            prop_assert_eq!((dims.width, dims.height), (width, height));
            prop_assert!(seq.image_state().original().unwrap().as_bytes().iter().all(|&b| b == 0));
        }
    }
}

#[test]
fn minimum_blur_keeps_uniform_colour() {
    let img = PixelBuffer::from_fn(9, 7, |_, _| [12, 200, 77, 255]).unwrap();
    let responses = process_all(
        FilterConfig::default(),
        [init_from(&img), Request::Blur { blur_factor: 1 }],
    );
    assert_eq!(outputs(&responses), vec![img]);
}

#[test]
fn variance_strictly_decreases_with_factor() {
    let img = checkerboard(64, 64, 8);
    let responses = process_all(
        FilterConfig::default(),
        [
            init_from(&img),
            Request::Blur { blur_factor: 1 },
            Request::Blur { blur_factor: 10 },
            Request::Blur { blur_factor: 50 },
        ],
    );
    let variances: Vec<f64> = outputs(&responses).iter().map(variance).collect();
    assert_eq!(variances.len(), 3);
    assert!(
        variances[0] > variances[1] && variances[1] > variances[2],
        "variances not strictly decreasing: {variances:?}",
    );
}

#[test]
fn edge_detect_on_blank_image_is_zero() {
    let img = PixelBuffer::from_fn(16, 16, |_, _| [90, 90, 90, 255]).unwrap();
    let responses = process_all(FilterConfig::default(), [init_from(&img), Request::EdgeDetect]);
    let edges = &outputs(&responses)[0];
    assert!(edges.as_bytes().chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
}

#[test]
fn edge_detect_on_vertical_split_peaks_at_boundary() {
    let img = split(20, 10);
    let responses = process_all(FilterConfig::default(), [init_from(&img), Request::EdgeDetect]);
    let edges = &outputs(&responses)[0];
    for y in 0..10 {
        for x in 0..20 {
            let v = edges.pixel(x, y).unwrap()[0];
            if x == 9 || x == 10 {
                assert!(v > 200, "weak response {v} at boundary ({x},{y})");
            } else {
                assert_eq!(v, 0, "unexpected response at ({x},{y})");
            }
        }
    }
}

#[test]
fn edge_detect_after_blur_reads_blurred_buffer() {
    let img = split(24, 12);
    let config = FilterConfig::default();

    let chained = process_all(
        config.clone(),
        [
            init_from(&img),
            Request::Blur { blur_factor: 20 },
            Request::EdgeDetect,
        ],
    );
    let direct = process_all(config.clone(), [init_from(&img), Request::EdgeDetect]);

    let chained_edges = &outputs(&chained)[1];
    let direct_edges = &outputs(&direct)[0];
    assert_ne!(chained_edges, direct_edges);

    let blurred = engine::compute(FilterOp::Blur(BlurFactor::new(20)), &img, &config);
    assert_eq!(
        *chained_edges,
        engine::compute(FilterOp::EdgeDetect, &blurred, &config)
    );
}

#[test]
fn reset_round_trip_restores_original_base() {
    let img = split(16, 16);
    let config = FilterConfig::default();

    let after_reset = process_all(
        config.clone(),
        [
            init_from(&img),
            Request::Blur { blur_factor: 35 },
            Request::Reset,
            Request::EdgeDetect,
        ],
    );
    let direct = process_all(config, [init_from(&img), Request::EdgeDetect]);

    let after_reset = outputs(&after_reset);
    // blur result, reset acknowledgement (the original), edges.
    assert_eq!(after_reset.len(), 3);
    assert_eq!(after_reset[1], img);
    assert_eq!(after_reset[2], outputs(&direct)[0]);
}

#[test]
fn burst_of_blurs_while_busy_yields_only_the_last() {
    let img = checkerboard(32, 32, 4);
    let config = FilterConfig::default();
    let mut seq = Sequencer::new(config.clone());
    seq.submit(init_from(&img));
    seq.submit(Request::Blur { blur_factor: 40 });

    let busy = seq.next_job().unwrap();
    for factor in [2, 5, 9] {
        assert!(seq.submit(Request::Blur { blur_factor: factor }).is_none());
    }
    let output = busy.run(seq.config());
    let mut responses: Vec<Response> = seq.complete(busy.ticket(), output).into_iter().collect();
    responses.extend(seq.drain());

    let ops: Vec<_> = responses
        .iter()
        .map(|r| r.as_result().unwrap().op)
        .collect();
    assert_eq!(
        ops,
        vec![
            Some(FilterOp::Blur(BlurFactor::new(40))),
            Some(FilterOp::Blur(BlurFactor::new(9))),
        ]
    );
    let last = &responses[1].as_result().unwrap().output;
    assert_eq!(
        *last,
        engine::compute(FilterOp::Blur(BlurFactor::new(9)), &img, &config)
    );
}

#[test]
fn filter_before_init_reports_no_image_loaded() {
    let responses = process_all(
        FilterConfig::default(),
        [Request::Blur { blur_factor: 3 }, Request::EdgeDetect],
    );
    assert_eq!(
        responses,
        vec![
            Response::error(FilterError::NoImageLoaded),
            Response::error(FilterError::NoImageLoaded),
        ]
    );
}

#[test]
fn result_dimensions_match_loaded_image() {
    let img = checkerboard(13, 5, 2);
    let responses = process_all(
        FilterConfig::default(),
        [
            init_from(&img),
            Request::Blur { blur_factor: 100 },
            Request::EdgeDetect,
        ],
    );
    for out in outputs(&responses) {
        assert_eq!(out.dimensions(), img.dimensions());
    }
}
