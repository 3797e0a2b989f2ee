// src/world/gradient.rs
//
// Permutation-table gradient noise (2D + 3D). Output is rescaled into [-1, 1].

use noise::NoiseFn;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// Observed peak magnitudes of the raw noise; dividing by these maps into [-1, 1].
const NORM_2D: f32 = 0.507;
const NORM_3D: f32 = 0.936;

#[rustfmt::skip]
const PERMUTATION: [u8; 256] = [
    151, 160, 137,  91,  90,  15, 131,  13, 201,  95,  96,  53, 194, 233,   7, 225,
    140,  36, 103,  30,  69, 142,   8,  99,  37, 240,  21,  10,  23, 190,   6, 148,
    247, 120, 234,  75,   0,  26, 197,  62,  94, 252, 219, 203, 117,  35,  11,  32,
     57, 177,  33,  88, 237, 149,  56,  87, 174,  20, 125, 136, 171, 168,  68, 175,
     74, 165,  71, 134, 139,  48,  27, 166,  77, 146, 158, 231,  83, 111, 229, 122,
     60, 211, 133, 230, 220, 105,  92,  41,  55,  46, 245,  40, 244, 102, 143,  54,
     65,  25,  63, 161,   1, 216,  80,  73, 209,  76, 132, 187, 208,  89,  18, 169,
    200, 196, 135, 130, 116, 188, 159,  86, 164, 100, 109, 198, 173, 186,   3,  64,
     52, 217, 226, 250, 124, 123,   5, 202,  38, 147, 118, 126, 255,  82,  85, 212,
    207, 206,  59, 227,  47,  16,  58,  17, 182, 189,  28,  42, 223, 183, 170, 213,
    119, 248, 152,   2,  44, 154, 163,  70, 221, 153, 101, 155, 167,  43, 172,   9,
    129,  22,  39, 253,  19,  98, 108, 110,  79, 113, 224, 232, 178, 185, 112, 104,
    218, 246,  97, 228, 251,  34, 242, 193, 238, 210, 144,  12, 191, 179, 162, 241,
     81,  51, 145, 235, 249,  14, 239, 107,  49, 192, 214,  31, 181, 199, 106, 157,
    184,  84, 204, 176, 115, 121,  50,  45, 127,   4, 150, 254, 138, 236, 205,  93,
    222, 114,  67,  29,  24,  72, 243, 141, 128, 195,  78,  66, 215,  61, 156, 180,
];

/// Gradient noise over a fixed 512-entry permutation (256 entries, twice).
///
/// Sampling never mutates anything, so one instance can be shared freely
/// between worker threads.
#[derive(Clone)]
pub struct GradientNoise {
    perm: Box<[u8; 512]>,
}

impl GradientNoise {
    /// The classic table.
    pub fn canonical() -> Self {
        Self::from_table(&PERMUTATION)
    }

    /// A uniformly random permutation, fixed for the lifetime of the value.
    pub fn seeded(seed: u64) -> Self {
        let mut table: Vec<u8> = (0..=255u8).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        table.shuffle(&mut rng);

        let mut base = [0u8; 256];
        base.copy_from_slice(&table);
        Self::from_table(&base)
    }

    fn from_table(base: &[u8; 256]) -> Self {
        let mut perm = Box::new([0u8; 512]);
        for i in 0..512 {
            perm[i] = base[i & 0xff];
        }
        Self { perm }
    }

    #[inline(always)]
    fn p(&self, i: usize) -> usize {
        self.perm[i] as usize
    }

    pub fn noise2(&self, x: f32, y: f32) -> f32 {
        let xf = x.floor();
        let yf = y.floor();

        let xi = (xf as i32 & 0xff) as usize;
        let yi = (yf as i32 & 0xff) as usize;

        let x = x - xf;
        let y = y - yf;

        let u = fade(x);
        let v = fade(y);

        let aa = self.p(self.p(xi) + yi);
        let ab = self.p(self.p(xi) + yi + 1);
        let ba = self.p(self.p(xi + 1) + yi);
        let bb = self.p(self.p(xi + 1) + yi + 1);

        let x1 = lerp(u, grad2(aa, x, y), grad2(ba, x - 1.0, y));
        let x2 = lerp(u, grad2(ab, x, y - 1.0), grad2(bb, x - 1.0, y - 1.0));

        (lerp(v, x1, x2) / NORM_2D).clamp(-1.0, 1.0)
    }

    pub fn noise3(&self, x: f32, y: f32, z: f32) -> f32 {
        let xf = x.floor();
        let yf = y.floor();
        let zf = z.floor();

        let xi = (xf as i32 & 0xff) as usize;
        let yi = (yf as i32 & 0xff) as usize;
        let zi = (zf as i32 & 0xff) as usize;

        let x = x - xf;
        let y = y - yf;
        let z = z - zf;

        let u = fade(x);
        let v = fade(y);
        let w = fade(z);

        let a = self.p(xi) + yi;
        let aa = self.p(a) + zi;
        let ab = self.p(a + 1) + zi;
        let b = self.p(xi + 1) + yi;
        let ba = self.p(b) + zi;
        let bb = self.p(b + 1) + zi;

        let raw = lerp(
            w,
            lerp(
                v,
                lerp(u, grad3(self.p(aa), x, y, z), grad3(self.p(ba), x - 1.0, y, z)),
                lerp(u, grad3(self.p(ab), x, y - 1.0, z), grad3(self.p(bb), x - 1.0, y - 1.0, z)),
            ),
            lerp(
                v,
                lerp(
                    u,
                    grad3(self.p(aa + 1), x, y, z - 1.0),
                    grad3(self.p(ba + 1), x - 1.0, y, z - 1.0),
                ),
                lerp(
                    u,
                    grad3(self.p(ab + 1), x, y - 1.0, z - 1.0),
                    grad3(self.p(bb + 1), x - 1.0, y - 1.0, z - 1.0),
                ),
            ),
        );

        (raw / NORM_3D).clamp(-1.0, 1.0)
    }
}

impl Default for GradientNoise {
    fn default() -> Self {
        Self::canonical()
    }
}

impl NoiseFn<f64, 2> for GradientNoise {
    fn get(&self, point: [f64; 2]) -> f64 {
        self.noise2(point[0] as f32, point[1] as f32) as f64
    }
}

impl NoiseFn<f64, 3> for GradientNoise {
    fn get(&self, point: [f64; 3]) -> f64 {
        self.noise3(point[0] as f32, point[1] as f32, point[2] as f32) as f64
    }
}

/// 6t^5 - 15t^4 + 10t^3
#[inline(always)]
fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline(always)]
fn lerp(t: f32, a: f32, b: f32) -> f32 {
    a + t * (b - a)
}

// 8 directions: 4 axes + 4 diagonals.
#[inline(always)]
fn grad2(hash: usize, x: f32, y: f32) -> f32 {
    match hash & 7 {
        0 => x + y,
        1 => -x + y,
        2 => x - y,
        3 => -x - y,
        4 => x,
        5 => -x,
        6 => y,
        _ => -y,
    }
}

// Cube edge midpoints (12 directions, 4 repeated to fill 16).
#[inline(always)]
fn grad3(hash: usize, x: f32, y: f32, z: f32) -> f32 {
    let h = hash & 15;
    let u = if h < 8 { x } else { y };
    let v = if h < 4 {
        y
    } else if h == 12 || h == 14 {
        x
    } else {
        z
    };
    (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_on_lattice_points() {
        let n = GradientNoise::canonical();
        for i in -3..3 {
            for j in -3..3 {
                assert_eq!(n.noise2(i as f32, j as f32), 0.0);
                assert_eq!(n.noise3(i as f32, j as f32, 1.0), 0.0);
            }
        }
    }

    #[test]
    fn stays_in_unit_range() {
        let n = GradientNoise::seeded(99);
        let mut peak = 0.0f32;
        for i in 0..4000 {
            let x = i as f32 * 0.173 - 300.0;
            let y = i as f32 * 0.311 + 17.0;
            let a = n.noise2(x, y);
            let b = n.noise3(x, y, x * 0.5);
            assert!((-1.0..=1.0).contains(&a));
            assert!((-1.0..=1.0).contains(&b));
            peak = peak.max(a.abs());
        }
        // Not a degenerate (all-zero) field.
        assert!(peak > 0.2);
    }

    #[test]
    fn wraps_every_256_lattice_units() {
        let n = GradientNoise::canonical();
        let a = n.noise2(3.25, 7.5);
        let b = n.noise2(3.25 + 256.0, 7.5 - 256.0);
        assert!((a - b).abs() < 1e-4);
    }

    #[test]
    fn seeds_change_the_field() {
        let a = GradientNoise::seeded(1);
        let b = GradientNoise::seeded(2);
        let differs = (0..64).any(|i| {
            let x = i as f32 * 0.37 + 0.1;
            a.noise2(x, 1.3) != b.noise2(x, 1.3)
        });
        assert!(differs);
        assert_eq!(
            GradientNoise::seeded(5).noise2(1.3, 2.7),
            GradientNoise::seeded(5).noise2(1.3, 2.7)
        );
    }

    #[test]
    fn noise_fn_matches_direct_calls() {
        let n = GradientNoise::canonical();
        let via_trait = NoiseFn::<f64, 2>::get(&n, [0.3, 0.9]);
        assert_eq!(via_trait, n.noise2(0.3, 0.9) as f64);
    }
}
