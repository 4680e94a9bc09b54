//! Arithmetic logic unit.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Add,
    Slt,
    Sltu,
    Xor,
    Or,
    And,
    Sll,
    Srl,
    Sra,
}

/// Branch conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
}

/// Perform one ALU operation.
pub fn alu(op: Operation, input1: u32, input2: u32) -> u32 {
    use self::Operation::*;

    match op {
        Add => input1.wrapping_add(input2),
        Slt => ((input1 as i32) < (input2 as i32)) as u32,
        Sltu => (input1 < input2) as u32,
        Xor => input1 ^ input2,
        Or => input1 | input2,
        And => input1 & input2,
        Sll => input1 << (input2 & 0x1f),
        Srl => input1 >> (input2 & 0x1f),
        Sra => ((input1 as i32) >> (input2 & 0x1f)) as u32,
    }
}

/// Evaluate a branch condition.
pub fn compare(cond: Condition, input1: u32, input2: u32) -> bool {
    use self::Condition::*;

    match cond {
        Eq => input1 == input2,
        Ne => input1 != input2,
        Lt => (input1 as i32) < (input2 as i32),
        Ge => (input1 as i32) >= (input2 as i32),
        Ltu => input1 < input2,
        Geu => input1 >= input2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_and_unsigned_comparison() {
        let minus_one = -1i32 as u32;
        assert_eq!(alu(Operation::Slt, minus_one, 1), 1);
        assert_eq!(alu(Operation::Sltu, minus_one, 1), 0);
        assert!(compare(Condition::Lt, minus_one, 0));
        assert!(!compare(Condition::Ltu, minus_one, 0));
        assert!(compare(Condition::Geu, minus_one, 0));
        assert!(compare(Condition::Ge, 5, 5));
    }

    #[test]
    fn shifts_use_low_five_bits() {
        assert_eq!(alu(Operation::Sll, 1, 33), 2);
        assert_eq!(alu(Operation::Srl, 0x8000_0000, 31), 1);
        assert_eq!(alu(Operation::Sra, 0x8000_0000, 31), 0xffff_ffff);
    }

    #[test]
    fn add_wraps() {
        assert_eq!(alu(Operation::Add, u32::MAX, 2), 1);
        assert_eq!(alu(Operation::Add, 10, -3i32 as u32), 7);
    }
}
