mod classifier;
mod series;
mod window;

pub use classifier::{
    classify, prepare, Classification, ClassifierConfig, Metric, DEFAULT_THRESHOLD_MINUTES,
    DEFAULT_WINDOW_SIZE,
};
pub use series::build_series;
