//! Arithmetic collaborator consumed by the server loop.

use tracing::debug;

/// Arithmetic capability dispatched to by the server.
///
/// Both operations are pure and total.
pub trait ArithmeticService: Send + Sync + 'static {
    fn add(&self, lhs: i32, rhs: i32) -> i32;
    fn subtract(&self, lhs: i32, rhs: i32) -> i32;
}

/// Default calculator. Overflow wraps in two's complement.
#[derive(Debug, Clone, Copy, Default)]
pub struct Calculator;

impl ArithmeticService for Calculator {
    fn add(&self, lhs: i32, rhs: i32) -> i32 {
        debug!("Service: adding {} and {}", lhs, rhs);
        lhs.wrapping_add(rhs)
    }

    fn subtract(&self, lhs: i32, rhs: i32) -> i32 {
        debug!("Service: subtracting {} from {}", rhs, lhs);
        lhs.wrapping_sub(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_subtract() {
        let calc = Calculator;
        assert_eq!(calc.add(3, 4), 7);
        assert_eq!(calc.subtract(10, 5), 5);
        assert_eq!(calc.subtract(5, 10), -5);
    }

    #[test]
    fn test_overflow_wraps() {
        let calc = Calculator;
        assert_eq!(calc.add(i32::MAX, 1), i32::MIN);
        assert_eq!(calc.subtract(i32::MIN, 1), i32::MAX);
    }
}
