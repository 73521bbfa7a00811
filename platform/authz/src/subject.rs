use serde_json::Value;

/// Subject-type wildcard accepted in rule subject lists.
pub const ALL_SUBJECTS: &str = "all";

/// A record paired with the subject type it belongs to.
///
/// The pairing lives beside the record for the duration of a check; the
/// record itself is never modified, so the type can't end up persisted or
/// echoed back to the caller.
#[derive(Debug, Clone, Copy)]
pub struct TaggedRecord<'a> {
    pub subject_type: &'a str,
    pub record: &'a Value,
}

impl<'a> TaggedRecord<'a> {
    pub fn new(subject_type: &'a str, record: &'a Value) -> Self {
        Self {
            subject_type,
            record,
        }
    }
}

/// What an action targets: a whole subject type or one concrete record.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Type(&'a str),
    Record(TaggedRecord<'a>),
}

impl<'a> Subject<'a> {
    pub fn record(subject_type: &'a str, record: &'a Value) -> Self {
        Subject::Record(TaggedRecord::new(subject_type, record))
    }

    pub fn subject_type(&self) -> &'a str {
        match self {
            Subject::Type(name) => name,
            Subject::Record(tagged) => tagged.subject_type,
        }
    }
}

impl<'a> From<&'a str> for Subject<'a> {
    fn from(name: &'a str) -> Self {
        Subject::Type(name)
    }
}

impl<'a> From<TaggedRecord<'a>> for Subject<'a> {
    fn from(tagged: TaggedRecord<'a>) -> Self {
        Subject::Record(tagged)
    }
}
