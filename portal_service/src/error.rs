use std::fmt::{self, Debug, Display};

pub struct SimpleError {
    pub msg: String,
}

impl SimpleError {
    pub fn new(msg: &str) -> Self {
        Self {
            msg: msg.to_owned(),
        }
    }
}

impl<T> From<T> for SimpleError where T : Display {
    fn from(err: T) -> Self {
        Self {
            msg: format!("{}", err),
        }
    }
}

impl Debug for SimpleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

pub trait LogError {
    type Output;
    fn log_error(self, tag: &str) -> Self::Output;
    fn log_error_consume(self, tag: &str);
}

impl<T, E> LogError for Result<T, E> where E : Into<SimpleError> {
    type Output = Option<T>;
    fn log_error(self, tag: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let err: SimpleError = err.into();
                log::error!("[{}] {}", tag, err.msg);
                None
            }
        }
    }
    fn log_error_consume(self, tag: &str) {
        self.log_error(tag);
    }
}
