//! Chunked `getMultipleAccounts`.
//!
//! The RPC node caps the number of keys per `getMultipleAccounts` call. The
//! address list is split into consecutive chunks under the cap, the chunks
//! are fetched concurrently and the results are stitched back together in
//! input order.

use futures::future;

use chainaccount_core::{
    address::Address,
    connection::Connection,
    error::TransportError,
    types::{Commitment, KeyedAccount},
};

/// Maximum number of addresses per `getMultipleAccounts` call.
pub const GET_MULTIPLE_ACCOUNTS_LIMIT: usize = 99;

/// Fetch `addresses` in chunks of at most `limit`.
///
/// The result has one entry per input address, in input order, duplicates
/// included; `None` marks an address with no stored account. The first
/// failing chunk fails the whole call and the other in-flight chunks are
/// dropped.
pub async fn get_multiple_accounts<C: Connection + ?Sized>(
    connection: &C,
    addresses: &[Address],
    commitment: Option<Commitment>,
    limit: usize,
) -> Result<Vec<Option<KeyedAccount>>, TransportError> {
    if addresses.is_empty() {
        return Ok(Vec::new());
    }
    let limit = limit.max(1);
    let chunks: Vec<&[Address]> = addresses.chunks(limit).collect();
    tracing::debug!(addresses = addresses.len(), chunks = chunks.len(), limit, "getMultipleAccounts");

    let calls = chunks.iter().map(|chunk| async move {
        let infos = connection.get_multiple_accounts(chunk, commitment).await?;
        if infos.len() != chunk.len() {
            return Err(TransportError::InvalidResponse(format!(
                "getMultipleAccounts returned {} accounts for {} keys",
                infos.len(),
                chunk.len()
            )));
        }
        Ok(chunk
            .iter()
            .zip(infos)
            .map(|(address, info)| {
                info.map(|account| KeyedAccount {
                    address: *address,
                    account,
                })
            })
            .collect::<Vec<_>>())
    });

    let results = future::try_join_all(calls).await?;
    Ok(results.into_iter().flatten().collect())
}
