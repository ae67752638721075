type Point = [f32; 2];

fn cross(o: Point, a: Point, b: Point) -> f32 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

fn signed_area(points: &[Point]) -> f32 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a[0] * b[1] - b[0] * a[1]
        })
        .sum::<f32>()
        * 0.5
}

fn contains(a: Point, b: Point, c: Point, p: Point) -> bool {
    cross(a, b, p) >= 0.0 && cross(b, c, p) >= 0.0 && cross(c, a, p) >= 0.0
}

/// Ear-clipping triangulation of a simple polygon. Returned triangles are counter-clockwise.
pub(crate) fn triangulate(points: &[Point]) -> Vec<u16> {
    if points.len() < 3 {
        return Vec::new();
    }
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    if signed_area(points) < 0.0 {
        remaining.reverse();
    }

    let mut triangles = Vec::with_capacity((points.len() - 2) * 3);
    while remaining.len() > 3 {
        let m = remaining.len();
        let corner = |i: usize| {
            (
                remaining[(i + m - 1) % m],
                remaining[i],
                remaining[(i + 1) % m],
            )
        };
        let is_ear = |i: usize| {
            let (p, c, n) = corner(i);
            if cross(points[p], points[c], points[n]) <= 0.0 {
                return false;
            }
            !remaining
                .iter()
                .filter(|&&q| q != p && q != c && q != n)
                .any(|&q| contains(points[p], points[c], points[n], points[q]))
        };

        // A degenerate polygon may have no ear left; cutting any corner still terminates.
        let i = (0..m).find(|&i| is_ear(i)).unwrap_or(0);
        let (p, c, n) = corner(i);
        triangles.extend([p as u16, c as u16, n as u16]);
        remaining.remove(i);
    }
    triangles.extend(remaining.iter().map(|&i| i as u16));
    triangles
}

/// Output of [`SkeletonClipper::clip_triangles`], reused between calls.
#[derive(Debug, Default)]
pub(crate) struct ClippedMesh {
    pub(crate) positions: Vec<Point>,
    pub(crate) uvs: Vec<Point>,
    pub(crate) triangles: Vec<u16>,
}

impl ClippedMesh {
    fn clear(&mut self) {
        self.positions.clear();
        self.uvs.clear();
        self.triangles.clear();
    }
}

/// Clips triangles against a polygon split into convex (triangle) pieces.
#[derive(Debug, Default)]
pub(crate) struct SkeletonClipper {
    pieces: Vec<[Point; 3]>,
    polygon: Vec<Point>,
    scratch: Vec<Point>,
}

impl SkeletonClipper {
    /// Starts clipping with a world-space polygon. Returns false when already clipping or the
    /// polygon is degenerate.
    pub(crate) fn clip_start(&mut self, polygon: &[Point]) -> bool {
        if self.is_clipping() || polygon.len() < 3 {
            return false;
        }
        let triangles = triangulate(polygon);
        self.pieces = triangles
            .chunks_exact(3)
            .map(|t| {
                [
                    polygon[usize::from(t[0])],
                    polygon[usize::from(t[1])],
                    polygon[usize::from(t[2])],
                ]
            })
            .filter(|[a, b, c]| cross(*a, *b, *c) > 0.0)
            .collect();
        self.is_clipping()
    }

    pub(crate) fn clip_end(&mut self) {
        self.pieces.clear();
    }

    pub(crate) fn is_clipping(&self) -> bool {
        !self.pieces.is_empty()
    }

    pub(crate) fn clip_triangles(
        &mut self,
        positions: &[Point],
        uvs: &[Point],
        triangles: &[u16],
        out: &mut ClippedMesh,
    ) {
        out.clear();
        for tri in triangles.chunks_exact(3) {
            let corners = [tri[0], tri[1], tri[2]].map(usize::from);
            let p = corners.map(|i| positions[i]);
            let t = corners.map(|i| uvs[i]);

            for piece in &self.pieces {
                self.polygon.clear();
                self.polygon.extend_from_slice(&p);
                clip_convex(&mut self.polygon, &mut self.scratch, piece);
                if self.polygon.len() < 3 {
                    continue;
                }
                if out.positions.len() + self.polygon.len() > usize::from(u16::MAX) {
                    log::warn!("clipped geometry exceeds 16-bit indices, dropping the rest");
                    return;
                }

                let base = out.positions.len() as u16;
                for &point in &self.polygon {
                    out.positions.push(point);
                    out.uvs.push(barycentric_uv(p, t, point));
                }
                for k in 1..self.polygon.len() as u16 - 1 {
                    out.triangles.extend([base, base + k, base + k + 1]);
                }
            }
        }
    }
}

/// Sutherland-Hodgman against a counter-clockwise triangle.
fn clip_convex(subject: &mut Vec<Point>, scratch: &mut Vec<Point>, clip: &[Point; 3]) {
    for k in 0..3 {
        if subject.is_empty() {
            return;
        }
        let a = clip[k];
        let b = clip[(k + 1) % 3];
        scratch.clear();
        let n = subject.len();
        for i in 0..n {
            let current = subject[i];
            let previous = subject[(i + n - 1) % n];
            let sc = cross(a, b, current);
            let sp = cross(a, b, previous);
            if sc >= 0.0 {
                if sp < 0.0 {
                    scratch.push(intersect(previous, current, sp, sc));
                }
                scratch.push(current);
            } else if sp >= 0.0 {
                scratch.push(intersect(previous, current, sp, sc));
            }
        }
        std::mem::swap(subject, scratch);
    }
}

fn intersect(p: Point, q: Point, sp: f32, sq: f32) -> Point {
    let t = sp / (sp - sq);
    [p[0] + (q[0] - p[0]) * t, p[1] + (q[1] - p[1]) * t]
}

fn barycentric_uv(p: [Point; 3], uv: [Point; 3], x: Point) -> Point {
    let denom = cross(p[0], p[1], p[2]);
    if denom.abs() <= f32::EPSILON {
        return uv[0];
    }
    let l1 = cross(p[0], x, p[2]) / denom;
    let l2 = cross(p[0], p[1], x) / denom;
    let l0 = 1.0 - l1 - l2;
    [
        uv[0][0] * l0 + uv[1][0] * l1 + uv[2][0] * l2,
        uv[0][1] * l0 + uv[1][1] * l1 + uv[2][1] * l2,
    ]
}
