//! Soft delete and restore across the source folder and the trash folder.
//!
//! IMAP has no atomic move here, so a delete is COPY to trash, then
//! `\Deleted` + EXPUNGE in the source. Sequence numbers do not survive that,
//! so the way back is located by `Message-ID` alone:
//!
//! ```text
//! Active(folder) --delete--> Trashed(trash, message_id) --restore--> Active(folder)
//!                                      \--delete in trash--> gone
//! ```

use crate::error::{Degrade, Error, Result};
use crate::imap_ops::{ImapOps, SearchQuery, StoreFlag};
use crate::models::{DeleteRecord, RestoreRecord, RestoreRequest};

/// Move message `seq` of `folder` to `trash_folder`, or expunge it outright
/// when `folder` already is the trash.
///
/// A failed copy aborts before the source is touched. A missing
/// `Message-ID` does not stop the delete, but leaves nothing to restore by.
pub fn delete<S: ImapOps + ?Sized>(
    session: &mut S,
    seq: u32,
    folder: &str,
    trash_folder: &str,
) -> Result<DeleteRecord> {
    session.select(folder)?;

    let message_id = session
        .fetch_message_id(seq)
        .or_skip("Message-ID lookup")
        .flatten()
        .unwrap_or_default();
    if message_id.is_empty() {
        log::warn!("message {seq} in {folder} has no Message-ID; restore will not find it");
    }

    if folder == trash_folder {
        session.add_flag(seq, StoreFlag::Deleted)?;
        session.expunge()?;
        log::info!("expunged message {seq} from trash {folder}");
        return Ok(DeleteRecord {
            id: seq.to_string(),
            from_folder: folder.to_string(),
            trash_folder: folder.to_string(),
            message_id,
            restorable: false,
        });
    }

    session.copy(seq, trash_folder)?;
    session.add_flag(seq, StoreFlag::Deleted)?;
    session.expunge()?;
    log::info!("moved message {seq} from {folder} to {trash_folder}");

    Ok(DeleteRecord {
        id: seq.to_string(),
        from_folder: folder.to_string(),
        trash_folder: trash_folder.to_string(),
        message_id,
        restorable: true,
    })
}

/// Reject a restore that cannot possibly match anything.
pub fn validate(request: &RestoreRequest) -> Result<()> {
    if request.message_id.trim().is_empty() {
        return Err(Error::Validation("message_id is required to restore".into()));
    }
    Ok(())
}

/// Copy the trashed message back to `from_folder` and remove it from trash.
///
/// When several trash messages carry the same `Message-ID`, the one with
/// the highest sequence number is restored.
pub fn restore<S: ImapOps + ?Sized>(
    session: &mut S,
    request: &RestoreRequest,
) -> Result<RestoreRecord> {
    validate(request)?;
    let message_id = request.message_id.trim();

    session.select(&request.trash_folder)?;
    let matches = session.search(&SearchQuery::MessageId(message_id.to_string()))?;
    let Some(&seq) = matches.last() else {
        return Err(Error::NotFound(format!(
            "message {message_id} in {}",
            request.trash_folder
        )));
    };

    session.copy(seq, &request.from_folder)?;
    session.add_flag(seq, StoreFlag::Deleted)?;
    session.expunge()?;
    log::info!(
        "restored {message_id} from {} to {}",
        request.trash_folder,
        request.from_folder
    );

    Ok(RestoreRecord {
        from_folder: request.from_folder.clone(),
        trash_folder: request.trash_folder.clone(),
    })
}
