//! Totally ordered node scores. Lower is better everywhere in the workspace.

use std::cmp::Ordering;
use std::fmt::Debug;

use serde_json::Value;

/// A node label usable as an OPEN-list key.
///
/// Floating-point scores are ordered with `total_cmp`, so NaN sorts after
/// every finite value instead of poisoning the queue.
pub trait Score: Clone + Debug + Send + Sync + 'static {
    fn total_cmp(&self, other: &Self) -> Ordering;

    /// Lossy numeric view, used for uncertainty statistics.
    fn to_f64(&self) -> f64;

    /// JSON view, used for annotations and reports.
    fn to_json(&self) -> Value;

    /// Strictly better (lower) than `other`.
    fn is_better_than(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Less
    }
}

macro_rules! int_score {
    ($($t:ty),*) => {
        $(
            impl Score for $t {
                fn total_cmp(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }

                #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
                fn to_f64(&self) -> f64 {
                    *self as f64
                }

                fn to_json(&self) -> Value {
                    Value::from(*self)
                }
            }
        )*
    };
}

int_score!(i32, i64, u32, u64, usize);

impl Score for f64 {
    fn total_cmp(&self, other: &Self) -> Ordering {
        f64::total_cmp(self, other)
    }

    fn to_f64(&self) -> f64 {
        *self
    }

    fn to_json(&self) -> Value {
        // Non-finite values map to null.
        Value::from(*self)
    }
}

impl Score for f32 {
    fn total_cmp(&self, other: &Self) -> Ordering {
        f32::total_cmp(self, other)
    }

    fn to_f64(&self) -> f64 {
        f64::from(*self)
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }
}
