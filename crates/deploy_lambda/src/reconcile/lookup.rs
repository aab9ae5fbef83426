use crate::adapters::functions::FunctionRecord;
use crate::adapters::roles::RoleRecord;

/// A remote resource that can be matched against a manifest identifier.
pub trait RemoteIdentifier {
    fn identifier(&self) -> &str;
}

impl RemoteIdentifier for RoleRecord {
    fn identifier(&self) -> &str {
        &self.arn
    }
}

impl RemoteIdentifier for FunctionRecord {
    fn identifier(&self) -> &str {
        &self.arn
    }
}

/// Finds the first record whose identifier equals `identifier`, ignoring
/// ASCII case. `records` must be the complete listing, not a single page.
pub fn find_by_identifier<'a, R: RemoteIdentifier>(
    records: &'a [R],
    identifier: &str,
) -> Option<&'a R> {
    records
        .iter()
        .find(|record| record.identifier().eq_ignore_ascii_case(identifier))
}
