//! `fn:error`, `fn:current-dateTime` and `fn:implicit-timezone`.
use super::helpers::atomize_optional;
use crate::datamodel::{AtomicValue, TaggedValue};
use crate::error::{Error, ErrorCode, Result};
use crate::runtime::base::EagerEvaluator;
use crate::runtime::frame::Frame;
use crate::runtime::iterator::BoxedIterator;

/// `fn:error($code?, $description?)`. Always fails.
#[derive(Debug, Default)]
pub struct ErrorFn {
    code: Option<BoxedIterator>,
    description: Option<BoxedIterator>,
}

impl ErrorFn {
    pub fn new(code: Option<BoxedIterator>, description: Option<BoxedIterator>) -> Self {
        Self { code, description }
    }

    fn raised(&self, frame: &mut Frame<'_>) -> Result<Error> {
        let code = match &self.code {
            Some(it) => atomize_optional(it.as_ref(), frame)?,
            None => None,
        };
        let (code, lexical) = match code {
            None => (ErrorCode::FOER0000, ErrorCode::FOER0000.as_str().to_owned()),
            Some(AtomicValue::QName(q)) => (ErrorCode::from_code(&q.local), q.to_string()),
            Some(other) => {
                let s = other.string_value();
                (ErrorCode::from_code(&s), s)
            }
        };
        let description = match &self.description {
            Some(it) => atomize_optional(it.as_ref(), frame)?.map(|d| d.string_value()),
            None => None,
        };
        let message = match (code, description) {
            (ErrorCode::Unknown, Some(d)) => format!("{lexical}: {d}"),
            (ErrorCode::Unknown, None) => lexical,
            (_, Some(d)) => d,
            (_, None) => "error raised by the query".to_owned(),
        };
        Ok(Error::new(code, message))
    }
}

impl EagerEvaluator for ErrorFn {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        Err(self.raised(frame)?)
    }
}

/// `fn:current-dateTime`: stable for the whole execution.
#[derive(Debug, Default)]
pub struct CurrentDateTime;

impl EagerEvaluator for CurrentDateTime {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let ctx = frame.ctx();
        let now = ctx.now();
        ctx.atomics().create(&AtomicValue::DateTime {
            value: now.naive_local(),
            tz: Some(*now.offset()),
        })
    }
}

/// `fn:implicit-timezone` as an `xs:dayTimeDuration`.
#[derive(Debug, Default)]
pub struct ImplicitTimezone;

impl EagerEvaluator for ImplicitTimezone {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let ctx = frame.ctx();
        let millis = i64::from(ctx.implicit_timezone().local_minus_utc()) * 1000;
        ctx.atomics().create(&AtomicValue::DayTimeDuration(millis))
    }
}
