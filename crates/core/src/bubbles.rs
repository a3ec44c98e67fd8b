//! Circle-packing layout for the interest-group bubble chart.
//!
//! Every call is a full, deterministic recompute: siblings are placed along a
//! front chain (largest first), the minimal enclosing circle is found with a
//! fixed-seed shuffle, and the largest radius scale that still fits the target
//! is found by bisection. Leaves keep at least `min_gap` between each other.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const FIT_ITERATIONS: usize = 48;
const FIT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleDatum {
    pub id: String,
    pub value: f64,
    pub group: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

impl Circle {
    pub const fn new(x: f64, y: f64, r: f64) -> Self {
        Self { x, y, r }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.r.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A datum with its placement in both display modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleNode {
    pub id: String,
    pub value: f64,
    pub group: String,
    pub compact: Circle,
    pub expanded: Circle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleLayoutEngine {
    pub compact: CanvasSize,
    pub expanded: CanvasSize,
    pub min_gap: f64,
}

impl BubbleLayoutEngine {
    pub fn new(compact: CanvasSize, expanded: CanvasSize, min_gap: f64) -> Self {
        Self {
            compact,
            expanded,
            min_gap,
        }
    }

    /// Lay out `data` for both the compact badge and the expanded view.
    /// Output order follows input order.
    pub fn layout(&self, data: &[BubbleDatum]) -> Vec<BubbleNode> {
        let compact = pack(data, self.compact, self.min_gap);
        let expanded = pack(data, self.expanded, self.min_gap);
        data.iter()
            .zip(compact)
            .zip(expanded)
            .map(|((datum, compact), expanded)| BubbleNode {
                id: datum.id.clone(),
                value: datum.value,
                group: datum.group.clone(),
                compact,
                expanded,
            })
            .collect()
    }
}

/// Number of bubbles per group, keyed by group name.
pub fn group_counts(data: &[BubbleDatum]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for datum in data {
        *counts.entry(datum.group.clone()).or_insert(0) += 1;
    }
    counts
}

/// Pack `data` into `target`, returning one circle per datum in input order.
///
/// Radii grow with `sqrt(value)`; non-positive or non-finite values get a
/// zero radius. If even zero-radius leaves cannot keep `min_gap` inside the
/// target, positions are compressed to fit and the gap is not guaranteed.
pub fn pack(data: &[BubbleDatum], target: CanvasSize, min_gap: f64) -> Vec<Circle> {
    if data.is_empty() {
        return Vec::new();
    }

    let center_x = target.width.max(0.0) / 2.0;
    let center_y = target.height.max(0.0) / 2.0;
    let bound = center_x.min(center_y);
    let half_gap = if min_gap.is_finite() {
        min_gap.max(0.0) / 2.0
    } else {
        0.0
    };

    let weights: Vec<f64> = data.iter().map(|d| leaf_weight(d.value)).collect();
    let mut order: Vec<usize> = (0..data.len()).collect();
    order.sort_by(|&a, &b| {
        weights[b]
            .partial_cmp(&weights[a])
            .unwrap_or(Ordering::Equal)
            .then_with(|| data[a].id.cmp(&data[b].id))
    });
    let max_weight = weights.iter().copied().fold(0.0, f64::max);

    let arrange = |scale: f64| {
        let mut circles: Vec<Circle> = order
            .iter()
            .map(|&i| Circle::new(0.0, 0.0, weights[i] * scale + half_gap))
            .collect();
        pack_siblings(&mut circles);
        let enclosing = enclose(&circles).unwrap_or_else(|| bounding_circle(&circles));
        (circles, enclosing)
    };
    let fits = |enclosing: &Circle| enclosing.r <= bound + FIT_EPSILON;

    let (circles, enclosing, scale) = {
        let (circles, enclosing) = arrange(0.0);
        if !fits(&enclosing) || max_weight == 0.0 {
            (circles, enclosing, 0.0)
        } else {
            let mut lo = 0.0;
            let mut hi = bound / max_weight;
            let mut best = (circles, enclosing);
            for _ in 0..FIT_ITERATIONS {
                let mid = (lo + hi) / 2.0;
                let candidate = arrange(mid);
                if fits(&candidate.1) {
                    lo = mid;
                    best = candidate;
                } else {
                    hi = mid;
                }
            }
            (best.0, best.1, lo)
        }
    };

    // Compression only kicks in when the gap alone overflows the target.
    let squeeze = if fits(&enclosing) || enclosing.r <= 0.0 {
        1.0
    } else {
        bound / enclosing.r
    };

    let mut out = vec![Circle::default(); data.len()];
    for (slot, circle) in order.iter().zip(&circles) {
        out[*slot] = Circle::new(
            center_x + (circle.x - enclosing.x) * squeeze,
            center_y + (circle.y - enclosing.y) * squeeze,
            weights[*slot] * scale,
        );
    }
    out
}

fn leaf_weight(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value.sqrt()
    } else {
        0.0
    }
}

/// Place circles tangent to each other around the origin, in slice order.
fn pack_siblings(circles: &mut [Circle]) {
    let n = circles.len();
    if n == 0 {
        return;
    }
    circles[0].x = 0.0;
    circles[0].y = 0.0;
    if n == 1 {
        return;
    }

    circles[0].x = -circles[1].r;
    circles[1].x = circles[0].r;
    circles[1].y = 0.0;
    if n == 2 {
        return;
    }

    let (first, second) = (circles[0], circles[1]);
    place(second, first, &mut circles[2]);

    // Front chain as an index arena: next/prev point at neighbours on the hull.
    let mut next = vec![0usize; n];
    let mut prev = vec![0usize; n];
    next[0] = 1;
    prev[2] = 1;
    next[1] = 2;
    prev[0] = 2;
    next[2] = 0;
    prev[1] = 0;

    let mut a = 0usize;
    let mut b = 1usize;
    let mut i = 3usize;

    'pack: while i < n {
        let (ca, cb) = (circles[a], circles[b]);
        place(ca, cb, &mut circles[i]);
        let c = i;

        // Closest intersecting circle on the chain, searching both ways.
        let mut j = next[b];
        let mut k = prev[a];
        let mut sj = circles[b].r;
        let mut sk = circles[a].r;
        loop {
            if sj <= sk {
                if intersects(&circles[j], &circles[c]) {
                    b = j;
                    next[a] = b;
                    prev[b] = a;
                    continue 'pack;
                }
                sj += circles[j].r;
                j = next[j];
            } else {
                if intersects(&circles[k], &circles[c]) {
                    a = k;
                    next[a] = b;
                    prev[b] = a;
                    continue 'pack;
                }
                sk += circles[k].r;
                k = prev[k];
            }
            if j == next[k] {
                break;
            }
        }

        prev[c] = a;
        next[c] = b;
        next[a] = c;
        prev[b] = c;
        b = c;

        let mut best = score(circles, a, next[a]);
        let mut cursor = next[c];
        while cursor != b {
            let candidate = score(circles, cursor, next[cursor]);
            if candidate < best {
                a = cursor;
                best = candidate;
            }
            cursor = next[cursor];
        }
        b = next[a];
        i += 1;
    }
}

/// Put `c` tangent to both `a` and `b`.
fn place(b: Circle, a: Circle, c: &mut Circle) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let d2 = dx * dx + dy * dy;
    if d2 > 0.0 {
        let a2 = (a.r + c.r) * (a.r + c.r);
        let b2 = (b.r + c.r) * (b.r + c.r);
        if a2 > b2 {
            let x = (d2 + b2 - a2) / (2.0 * d2);
            let y = (b2 / d2 - x * x).max(0.0).sqrt();
            c.x = b.x - x * dx - y * dy;
            c.y = b.y - x * dy + y * dx;
        } else {
            let x = (d2 + a2 - b2) / (2.0 * d2);
            let y = (a2 / d2 - x * x).max(0.0).sqrt();
            c.x = a.x + x * dx - y * dy;
            c.y = a.y + x * dy + y * dx;
        }
    } else {
        c.x = a.x + c.r;
        c.y = a.y;
    }
}

fn intersects(a: &Circle, b: &Circle) -> bool {
    let dr = a.r + b.r - 1e-6;
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dr > 0.0 && dr * dr > dx * dx + dy * dy
}

/// Squared distance from the origin to the weighted midpoint of `a` and `b`.
fn score(circles: &[Circle], a: usize, b: usize) -> f64 {
    let (a, b) = (circles[a], circles[b]);
    let ab = a.r + b.r;
    if ab <= 0.0 {
        return a.x * a.x + a.y * a.y;
    }
    let dx = (a.x * b.r + b.x * a.r) / ab;
    let dy = (a.y * b.r + b.y * a.r) / ab;
    dx * dx + dy * dy
}

/// Linear congruential generator with a fixed seed, so shuffles repeat.
struct Lcg(u64);

impl Lcg {
    const MODULUS: u64 = 1 << 32;

    fn next_unit(&mut self) -> f64 {
        self.0 = (1_664_525 * self.0 + 1_013_904_223) % Self::MODULUS;
        self.0 as f64 / Self::MODULUS as f64
    }
}

fn shuffle(circles: &mut [Circle]) {
    let mut rng = Lcg(1);
    let mut n = circles.len();
    while n > 0 {
        let i = (rng.next_unit() * n as f64) as usize;
        n -= 1;
        circles.swap(n, i.min(n));
    }
}

/// Smallest circle enclosing every circle in `circles`.
fn enclose(circles: &[Circle]) -> Option<Circle> {
    let mut shuffled = circles.to_vec();
    shuffle(&mut shuffled);

    let mut basis: Vec<Circle> = Vec::new();
    let mut enclosing: Option<Circle> = None;
    let mut i = 0;
    while i < shuffled.len() {
        let p = shuffled[i];
        if enclosing.is_some_and(|e| encloses_weak(&e, &p)) {
            i += 1;
        } else {
            basis = extend_basis(&basis, p)?;
            enclosing = Some(enclose_basis(&basis));
            i = 0;
        }
    }
    enclosing.filter(Circle::is_finite)
}

fn extend_basis(basis: &[Circle], p: Circle) -> Option<Vec<Circle>> {
    if encloses_weak_all(&p, basis) {
        return Some(vec![p]);
    }

    for &b in basis {
        if encloses_not(&p, &b) && encloses_weak_all(&enclose_basis2(&b, &p), basis) {
            return Some(vec![b, p]);
        }
    }

    for (i, &bi) in basis.iter().enumerate() {
        for &bj in &basis[i + 1..] {
            if encloses_not(&enclose_basis2(&bi, &bj), &p)
                && encloses_not(&enclose_basis2(&bi, &p), &bj)
                && encloses_not(&enclose_basis2(&bj, &p), &bi)
                && encloses_weak_all(&enclose_basis3(&bi, &bj, &p), basis)
            {
                return Some(vec![bi, bj, p]);
            }
        }
    }

    None
}

fn encloses_not(a: &Circle, b: &Circle) -> bool {
    let dr = a.r - b.r;
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dr < 0.0 || dr * dr < dx * dx + dy * dy
}

fn encloses_weak(a: &Circle, b: &Circle) -> bool {
    let dr = a.r - b.r + a.r.max(b.r).max(1.0) * 1e-9;
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dr > 0.0 && dr * dr > dx * dx + dy * dy
}

fn encloses_weak_all(a: &Circle, basis: &[Circle]) -> bool {
    basis.iter().all(|b| encloses_weak(a, b))
}

fn enclose_basis(basis: &[Circle]) -> Circle {
    match basis {
        [a] => *a,
        [a, b] => enclose_basis2(a, b),
        [a, b, c] => enclose_basis3(a, b, c),
        _ => bounding_circle(basis),
    }
}

fn enclose_basis2(a: &Circle, b: &Circle) -> Circle {
    let x21 = b.x - a.x;
    let y21 = b.y - a.y;
    let r21 = b.r - a.r;
    let l = x21.hypot(y21);
    if l <= f64::EPSILON {
        return if a.r >= b.r { *a } else { *b };
    }
    Circle::new(
        (a.x + b.x + x21 / l * r21) / 2.0,
        (a.y + b.y + y21 / l * r21) / 2.0,
        (l + a.r + b.r) / 2.0,
    )
}

fn enclose_basis3(a: &Circle, b: &Circle, c: &Circle) -> Circle {
    let (x1, y1, r1) = (a.x, a.y, a.r);
    let (x2, y2, r2) = (b.x, b.y, b.r);
    let (x3, y3, r3) = (c.x, c.y, c.r);
    let a2 = x1 - x2;
    let a3 = x1 - x3;
    let b2 = y1 - y2;
    let b3 = y1 - y3;
    let c2 = r2 - r1;
    let c3 = r3 - r1;
    let d1 = x1 * x1 + y1 * y1 - r1 * r1;
    let d2 = d1 - x2 * x2 - y2 * y2 + r2 * r2;
    let d3 = d1 - x3 * x3 - y3 * y3 + r3 * r3;
    let ab = a3 * b2 - a2 * b3;
    let xa = (b2 * d3 - b3 * d2) / (ab * 2.0) - x1;
    let xb = (b3 * c2 - b2 * c3) / ab;
    let ya = (a3 * d2 - a2 * d3) / (ab * 2.0) - y1;
    let yb = (a2 * c3 - a3 * c2) / ab;
    let qa = xb * xb + yb * yb - 1.0;
    let qb = 2.0 * (r1 + xa * xb + ya * yb);
    let qc = xa * xa + ya * ya - r1 * r1;
    let r = -(if qa.abs() > 1e-6 {
        (qb + (qb * qb - 4.0 * qa * qc).sqrt()) / (2.0 * qa)
    } else {
        qc / qb
    });
    Circle::new(x1 + xa + xb * r, y1 + ya + yb * r, r)
}

/// Loose enclosing circle around the bounding-box centre.
fn bounding_circle(circles: &[Circle]) -> Circle {
    if circles.is_empty() {
        return Circle::default();
    }
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for c in circles {
        min_x = min_x.min(c.x - c.r);
        min_y = min_y.min(c.y - c.r);
        max_x = max_x.max(c.x + c.r);
        max_y = max_y.max(c.y + c.r);
    }
    let x = (min_x + max_x) / 2.0;
    let y = (min_y + max_y) / 2.0;
    let r = circles
        .iter()
        .map(|c| (c.x - x).hypot(c.y - y) + c.r)
        .fold(0.0, f64::max);
    Circle::new(x, y, r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datum(id: &str, value: f64, group: &str) -> BubbleDatum {
        BubbleDatum {
            id: id.to_string(),
            value,
            group: group.to_string(),
        }
    }

    fn sample() -> Vec<BubbleDatum> {
        vec![
            datum("shoes/running", 5.0, "shoes"),
            datum("shoes/hiking", 2.0, "shoes"),
            datum("cars/suv", 1.0, "cars"),
            datum("cars/ev", 3.0, "cars"),
            datum("travel/beach", 1.0, "travel"),
            datum("travel/ski", 4.0, "travel"),
            datum("books/sci-fi", 1.0, "books"),
        ]
    }

    fn assert_gap_and_fit(circles: &[Circle], size: CanvasSize, gap: f64) {
        let (cx, cy) = (size.width / 2.0, size.height / 2.0);
        let bound = cx.min(cy);
        for (i, a) in circles.iter().enumerate() {
            assert!(
                (a.x - cx).hypot(a.y - cy) + a.r <= bound + 1e-6,
                "circle {i} escapes the target: {a:?}"
            );
            for b in &circles[i + 1..] {
                let distance = (a.x - b.x).hypot(a.y - b.y);
                assert!(
                    distance + 1e-4 >= a.r + b.r + gap,
                    "circles {a:?} and {b:?} closer than the gap"
                );
            }
        }
    }

    #[test]
    fn packing_is_deterministic() {
        let data = sample();
        let size = CanvasSize::new(300.0, 200.0);
        let first = pack(&data, size, 2.0);
        let second = pack(&data, size, 2.0);
        assert_eq!(first, second);
    }

    #[test]
    fn packed_leaves_fit_and_keep_their_gap() {
        let data = sample();
        for size in [CanvasSize::new(48.0, 48.0), CanvasSize::new(420.0, 300.0)] {
            let circles = pack(&data, size, 1.5);
            assert_eq!(circles.len(), data.len());
            assert_gap_and_fit(&circles, size, 1.5);
        }
    }

    #[test]
    fn larger_values_get_larger_radii() {
        let circles = pack(&sample(), CanvasSize::new(200.0, 200.0), 1.0);
        // running(5) > ski(4) > ev(3) > hiking(2) > suv(1)
        assert!(circles[0].r > circles[5].r);
        assert!(circles[5].r > circles[3].r);
        assert!(circles[3].r > circles[1].r);
        assert!(circles[1].r > circles[2].r);
        assert!((circles[2].r - circles[4].r).abs() < 1e-9);
    }

    #[test]
    fn single_leaf_is_centred_and_fills_the_target() {
        let circles = pack(
            &[datum("only", 9.0, "g")],
            CanvasSize::new(100.0, 60.0),
            4.0,
        );
        let c = circles[0];
        assert!((c.x - 50.0).abs() < 1e-6);
        assert!((c.y - 30.0).abs() < 1e-6);
        assert!((c.r - 28.0).abs() < 1e-3);
    }

    #[test]
    fn non_positive_values_collapse_to_zero_radius() {
        let circles = pack(
            &[
                datum("a", 0.0, "g"),
                datum("b", -3.0, "g"),
                datum("c", f64::NAN, "g"),
            ],
            CanvasSize::new(100.0, 100.0),
            2.0,
        );
        assert!(circles.iter().all(|c| c.r == 0.0));
        assert_gap_and_fit(&circles, CanvasSize::new(100.0, 100.0), 2.0);
    }

    #[test]
    fn appending_a_node_recomputes_the_whole_layout() {
        let engine = BubbleLayoutEngine::new(
            CanvasSize::new(40.0, 40.0),
            CanvasSize::new(400.0, 400.0),
            1.0,
        );
        let mut data = sample();
        let before = engine.layout(&data);
        data.push(datum("books/poetry", 8.0, "books"));
        let after = engine.layout(&data);

        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(after[0].id, before[0].id);
        assert_gap_and_fit(
            &after.iter().map(|n| n.expanded).collect::<Vec<_>>(),
            engine.expanded,
            1.0,
        );
        assert_gap_and_fit(
            &after.iter().map(|n| n.compact).collect::<Vec<_>>(),
            engine.compact,
            1.0,
        );
    }

    #[test]
    fn empty_input_yields_empty_layout() {
        let engine = BubbleLayoutEngine::new(
            CanvasSize::new(40.0, 40.0),
            CanvasSize::new(400.0, 400.0),
            1.0,
        );
        assert!(engine.layout(&[]).is_empty());
    }

    #[test]
    fn enclose_contains_every_circle() {
        let circles = vec![
            Circle::new(0.0, 0.0, 3.0),
            Circle::new(10.0, 0.0, 2.0),
            Circle::new(4.0, 7.0, 1.0),
            Circle::new(-5.0, 2.0, 4.0),
        ];
        let e = enclose(&circles).expect("enclosing circle");
        for c in &circles {
            assert!((c.x - e.x).hypot(c.y - e.y) + c.r <= e.r + 1e-6);
        }
        assert!(e.r <= bounding_circle(&circles).r + 1e-6);
    }

    #[test]
    fn group_counts_tallies_each_group() {
        let counts = group_counts(&sample());
        assert_eq!(counts.get("shoes"), Some(&2));
        assert_eq!(counts.get("books"), Some(&1));
        assert_eq!(counts.len(), 4);
    }
}
