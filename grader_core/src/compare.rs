use crate::Status;

pub enum CompareResult {
    Same,
    Different,
}

impl From<CompareResult> for Status {
    fn from(v: CompareResult) -> Self {
        match v {
            CompareResult::Same => Status::Accepted,
            CompareResult::Different => Status::WrongAnswer,
        }
    }
}

pub trait CompareMode {
    fn compare(&self, expected: &str, actual: &str) -> CompareResult;
}

/// Equal once trailing whitespace and newlines are dropped from both sides.
pub struct TrailingWhitespaceCompare;

impl CompareMode for TrailingWhitespaceCompare {
    fn compare(&self, expected: &str, actual: &str) -> CompareResult {
        if expected.trim_end() == actual.trim_end() {
            CompareResult::Same
        } else {
            CompareResult::Different
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(expected: &str, actual: &str) -> Status {
        TrailingWhitespaceCompare.compare(expected, actual).into()
    }

    #[test]
    fn trailing_newlines_are_ignored() {
        assert_eq!(status("Hello\n", "Hello"), Status::Accepted);
        assert_eq!(status("Hello", "Hello \n\n\t"), Status::Accepted);
    }

    #[test]
    fn leading_and_inner_whitespace_matter() {
        assert_eq!(status("Hello", " Hello"), Status::WrongAnswer);
        assert_eq!(status("1 2", "1  2"), Status::WrongAnswer);
        assert_eq!(status("Hello\n", "Goodbye"), Status::WrongAnswer);
    }
}
