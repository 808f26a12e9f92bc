use approx::assert_abs_diff_eq;
use skewdet_core::{skew_iou, CellIndex, DecodedScale, GridShape, OrientedBox};
use skewdet_nms::{post_process, rotated_nms, Detection, NmsParams};

fn square(cx: f32, cy: f32, conf: f32) -> Detection {
    Detection::new(OrientedBox::new(cx, cy, 10.0, 10.0, 0.0), conf, 1.0, 0)
}

/// Five tight clusters of three boxes, clusters 100 px apart.
fn clusters() -> Vec<Detection> {
    let mut out = Vec::new();
    for k in 0..5 {
        let x = 100.0 * k as f32;
        let theta = 0.1 * k as f32;
        let class_id = k % 2;
        for (j, (dx, conf)) in [(0.0, 0.9), (0.6, 0.7), (-0.4, 0.6)].into_iter().enumerate() {
            out.push(Detection::new(
                OrientedBox::new(x + dx, 50.0 + 0.3 * j as f32, 12.0, 8.0, theta),
                conf - 0.01 * k as f32,
                0.8,
                class_id,
            ));
        }
    }
    out
}

#[test]
fn single_low_confidence_candidate_is_dropped() {
    let shape = GridShape::new(1, 1, 1);
    let scale = DecodedScale::from_parts(
        shape,
        1,
        32.0,
        vec![OrientedBox::new(0.5, 0.5, 0.5, 0.5, 0.0)],
        vec![0.0],
        vec![0.4],
        vec![1.0],
    )
    .unwrap();
    let params = NmsParams {
        conf_thres: 0.5,
        ..NmsParams::default()
    };
    let out = post_process(&[scale], &params).unwrap();
    assert_eq!(out, vec![Vec::<Detection>::new()]);
}

#[test]
fn confident_pair_merges_into_one_weighted_box() {
    let strong = square(0.0, 0.0, 0.9);
    let weak = square(0.5, 0.5, 0.3);
    let iou = skew_iou(&strong.bbox, &weak.bbox).unwrap();
    assert!(iou > 0.8, "pair iou {iou}");

    let out = rotated_nms(&[weak, strong], &NmsParams::default()).unwrap();
    assert_eq!(out.len(), 1);
    let m = out[0].bbox;
    assert_abs_diff_eq!(m.cx, 0.125, epsilon = 1e-6);
    assert_abs_diff_eq!(m.cy, 0.125, epsilon = 1e-6);
    assert!(m.cx < 0.25, "merged box leans toward the confident one");
}

#[test]
fn suppression_is_idempotent_on_separated_clusters() {
    let params = NmsParams::default();
    let once = rotated_nms(&clusters(), &params).unwrap();
    assert_eq!(once.len(), 5);
    let twice = rotated_nms(&once, &params).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn raising_the_threshold_never_keeps_fewer() {
    // Pairs of 10x10 squares shifted by 1..8 px: IoU (10-d)/(10+d).
    let mut cands = Vec::new();
    for d in 1..=8 {
        let x = 100.0 * d as f32;
        cands.push(square(x, 0.0, 0.9));
        cands.push(square(x + d as f32, 0.0, 0.8));
    }
    let mut last = 0usize;
    for t in [0.05, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.95] {
        let params = NmsParams {
            nms_thres: t,
            ..NmsParams::default()
        };
        let kept = rotated_nms(&cands, &params).unwrap().len();
        assert!(kept >= last, "nms_thres {t}: {kept} < {last}");
        last = kept;
    }
    assert_eq!(last, cands.len());
}

#[test]
fn images_are_processed_independently() {
    let shape = GridShape::new(3, 1, 2);
    let n = shape.cells();
    let mut objectness = vec![0.0; n];
    let boxes = (0..n)
        .map(|i| {
            let c = shape.unravel(i);
            OrientedBox::new(c.gx as f32 + 0.5, c.gy as f32 + 0.5, 0.8, 0.4, 0.0)
        })
        .collect();
    for b in [0, 2] {
        for (gy, gx) in [(0, 0), (1, 1)] {
            objectness[shape.index(CellIndex::new(b, 0, gy, gx))] = 0.9;
        }
    }
    let scale = DecodedScale::from_parts(
        shape,
        1,
        64.0,
        boxes,
        vec![0.0; n],
        objectness,
        vec![1.0; n],
    )
    .unwrap();

    let out = post_process(&[scale], &NmsParams::default()).unwrap();
    assert_eq!(out.iter().map(Vec::len).collect::<Vec<_>>(), [2, 0, 2]);
    assert_eq!(out[0], out[2]);
}
