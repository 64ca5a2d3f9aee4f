/// Numeric literal value. Formulas never evaluate numbers inside the engine
/// (that is the storage layer's job), so this only needs construction and
/// comparison; rendering goes through the scale recorded next to it.
#[derive(Debug, Clone, PartialEq, Copy)]
pub struct Number(f64);

impl Number {
    pub fn new(value: f64) -> Self {
        Number(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}
