use std::ops::{Add, Mul, Sub};

// ─────────────────────────────────────────────────────────────────────────────
// Vec3
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    /// Scene up axis.
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub const fn from_array(arr: [f64; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    #[must_use]
    pub const fn length_squared(self) -> f64 {
        self.dot(self)
    }

    #[must_use]
    pub const fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[must_use]
    pub const fn cross(self, rhs: Self) -> Self {
        Self {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    /// `None` for zero-length or non-finite vectors.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len.is_finite() && len > 0.0 {
            Some(Self::new(self.x / len, self.y / len, self.z / len))
        } else {
            None
        }
    }

    /// Any unit vector perpendicular to `self`. `self` must be normalized.
    #[must_use]
    pub fn any_perpendicular(self) -> Self {
        let helper = if self.x.abs() < 0.9 { Self::X } else { Self::Y };
        self.cross(helper).normalized().unwrap_or(Self::Z)
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

#[cfg(test)]
impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, scale: f64) -> Self::Output {
        Self::new(self.x * scale, self.y * scale, self.z * scale)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Point3
// ─────────────────────────────────────────────────────────────────────────────

/// A sample position on a plotted path, in scene (Y-up) coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub const fn from_array(arr: [f64; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add<Vec3> for Point3 {
    type Output = Self;
    fn add(self, offset: Vec3) -> Self::Output {
        Self::new(self.x + offset.x, self.y + offset.y, self.z + offset.z)
    }
}

impl Sub for Point3 {
    type Output = Vec3;
    fn sub(self, origin: Self) -> Self::Output {
        Vec3::new(self.x - origin.x, self.y - origin.y, self.z - origin.z)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Quaternion
// ─────────────────────────────────────────────────────────────────────────────

/// Unit rotation quaternion stored as `[x, y, z, w]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    /// Shortest-arc rotation taking unit vector `from` onto unit vector `to`.
    #[must_use]
    pub fn from_unit_vectors(from: Vec3, to: Vec3) -> Self {
        let r = from.dot(to) + 1.0;
        let raw = if r < f64::EPSILON {
            // Opposite vectors: rotate half a turn around any perpendicular axis.
            if from.x.abs() > from.z.abs() {
                Self { x: -from.y, y: from.x, z: 0.0, w: 0.0 }
            } else {
                Self { x: 0.0, y: -from.z, z: from.y, w: 0.0 }
            }
        } else {
            let axis = from.cross(to);
            Self { x: axis.x, y: axis.y, z: axis.z, w: r }
        };
        raw.normalized()
    }

    #[must_use]
    pub fn normalized(self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if len == 0.0 || !len.is_finite() {
            return Self::IDENTITY;
        }
        Self {
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
            w: self.w / len,
        }
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

/// Swaps the 2nd and 3rd components: math space is Z-up, the scene is Y-up.
#[must_use]
pub const fn flip_axes(v: [f64; 3]) -> [f64; 3] {
    [v[0], v[2], v[1]]
}
