use crate::record::Record;
use crate::store::{RecordStore, StoreResult};

/// Records returned by a listing.
pub const LIST_LIMIT: usize = 10;

/// First [`LIST_LIMIT`] records in whatever order the store yields them.
pub async fn list_records<S>(store: &S) -> StoreResult<Vec<Record>>
where
    S: RecordStore + ?Sized,
{
    store.find(LIST_LIMIT).await
}
