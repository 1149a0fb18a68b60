mod client;
mod decision;

pub use client::{Classifier, PhishClassifier};
pub use decision::ClassifierVerdict;
