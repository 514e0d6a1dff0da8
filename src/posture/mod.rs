mod classifier;

pub use classifier::{classify_raw, Classification, ClassifierConfig, PostureClassifier};
