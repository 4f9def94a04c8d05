//! Sequential scan over a record file with an optional attribute predicate.

use crate::common::{AttrType, CompOp, Error, PageNum, RecordId, Result};

use super::record_file::FIRST_RECORD_PAGE;
use super::record_page::RecordPageHeader;
use super::{Record, RecordFile};

/// Which way a scan walks the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    /// Pages from 2 upward, slots ascending.
    #[default]
    Forward,
    /// Last page downward, slots descending.
    Backward,
}

/// `attr <comp_op> value`, where `attr` is the `attr_len` bytes at
/// `attr_offset` in each record.
///
/// A predicate without a value, or with [`CompOp::NoOp`], matches everything.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPredicate {
    pub attr_type: AttrType,
    pub attr_len: usize,
    pub attr_offset: usize,
    pub comp_op: CompOp,
    pub value: Option<Vec<u8>>,
}

impl ScanPredicate {
    /// Predicate that accepts every record.
    pub fn all() -> Self {
        Self {
            attr_type: AttrType::Int,
            attr_len: 4,
            attr_offset: 0,
            comp_op: CompOp::NoOp,
            value: None,
        }
    }

    pub fn new(
        attr_type: AttrType,
        attr_len: usize,
        attr_offset: usize,
        comp_op: CompOp,
        value: Vec<u8>,
    ) -> Self {
        Self {
            attr_type,
            attr_len,
            attr_offset,
            comp_op,
            value: Some(value),
        }
    }

    fn matches_everything(&self) -> bool {
        self.value.is_none() || self.comp_op == CompOp::NoOp
    }

    fn validate(&self, record_size: usize) -> Result<()> {
        if self.matches_everything() {
            return Ok(());
        }
        if self.attr_offset + self.attr_len > record_size {
            return Err(Error::InvalidScan(format!(
                "attribute [{}, {}) overruns {}-byte records",
                self.attr_offset,
                self.attr_offset + self.attr_len,
                record_size
            )));
        }
        if let Some(len) = self.attr_type.fixed_len() {
            if self.attr_len != len {
                return Err(Error::InvalidScan(format!(
                    "{} attributes are {} bytes, not {}",
                    self.attr_type, len, self.attr_len
                )));
            }
        }
        match &self.value {
            Some(value) if value.len() != self.attr_len => Err(Error::InvalidScan(format!(
                "value is {} bytes, attribute is {}",
                value.len(),
                self.attr_len
            ))),
            _ => Ok(()),
        }
    }

    /// Evaluate against one record's bytes.
    pub fn eval(&self, data: &[u8]) -> bool {
        match &self.value {
            Some(value) if self.comp_op != CompOp::NoOp => {
                let attr = &data[self.attr_offset..self.attr_offset + self.attr_len];
                self.comp_op.eval(self.attr_type, attr, value)
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Next slot to look at.
    At { page: u64, slot: usize },
    Exhausted,
    Closed,
}

/// Cursor over the live records of a [`RecordFile`] that satisfy a
/// [`ScanPredicate`].
///
/// Records are copied out one at a time; no page stays pinned between calls.
/// The scan borrows the file, so it cannot be modified underneath.
///
/// # Example
/// ```no_run
/// # use microsql::record::{RecordFile, RecordFileScan, ScanDirection, ScanPredicate};
/// # fn demo(rf: &RecordFile) -> microsql::Result<()> {
/// let scan = RecordFileScan::open(rf, ScanPredicate::all(), ScanDirection::Forward)?;
/// for rec in scan {
///     println!("{}", rec?.rid());
/// }
/// # Ok(())
/// # }
/// ```
pub struct RecordFileScan<'a> {
    file: &'a RecordFile,
    predicate: ScanPredicate,
    direction: ScanDirection,
    state: ScanState,
}

impl<'a> RecordFileScan<'a> {
    /// # Errors
    /// `Error::InvalidScan` if the predicate does not fit the file's records.
    pub fn open(
        file: &'a RecordFile,
        predicate: ScanPredicate,
        direction: ScanDirection,
    ) -> Result<Self> {
        predicate.validate(file.record_size())?;

        let state = match (direction, file.last_page()) {
            (_, None) => ScanState::Exhausted,
            (ScanDirection::Forward, Some(_)) => ScanState::At {
                page: FIRST_RECORD_PAGE,
                slot: 0,
            },
            (ScanDirection::Backward, Some(last)) => ScanState::At {
                page: last.0,
                slot: file.records_per_page() - 1,
            },
        };

        Ok(Self {
            file,
            predicate,
            direction,
            state,
        })
    }

    #[inline]
    pub fn direction(&self) -> ScanDirection {
        self.direction
    }

    /// Next matching record.
    ///
    /// # Errors
    /// - `Error::EndOfScan` once every record has been visited
    /// - `Error::InvalidScan` after [`close`](Self::close)
    pub fn next_rec(&mut self) -> Result<Record> {
        let (mut page, mut slot) = match self.state {
            ScanState::At { page, slot } => (page, slot),
            ScanState::Exhausted => return Err(Error::EndOfScan),
            ScanState::Closed => return Err(Error::InvalidScan("scan is closed".into())),
        };

        let file = self.file;
        let record_size = file.record_size();
        let per_page = file.records_per_page();
        let last_page = FIRST_RECORD_PAGE + file.num_pages() - 1;

        loop {
            let page_num = PageNum::new(page);
            let guard = file.buffer().fetch_page_read(page_num)?;
            let ph = RecordPageHeader::from_bytes(guard.as_slice())?;

            while slot < per_page {
                let current = slot;
                let step = self.step_slot(slot);

                if !ph.bitmap.test(current) {
                    let offset = ph.slot_offset(current, record_size);
                    let data = &guard.as_slice()[offset..offset + record_size];
                    if self.predicate.eval(data) {
                        let rec =
                            Record::new(RecordId::new(page_num, current as u32), data.to_vec());
                        self.state = match step {
                            Some(next) => ScanState::At { page, slot: next },
                            None => self.next_page_state(page, last_page),
                        };
                        return Ok(rec);
                    }
                }

                match step {
                    Some(next) => slot = next,
                    None => break,
                }
            }
            drop(guard);

            match self.next_page_state(page, last_page) {
                ScanState::At { page: p, slot: s } => {
                    page = p;
                    slot = s;
                }
                other => {
                    self.state = other;
                    return Err(Error::EndOfScan);
                }
            }
        }
    }

    /// Finish the scan. Further calls to [`next_rec`](Self::next_rec) fail.
    pub fn close(&mut self) {
        self.state = ScanState::Closed;
    }

    /// Slot after `slot` on the same page, `None` at the page edge.
    fn step_slot(&self, slot: usize) -> Option<usize> {
        match self.direction {
            ScanDirection::Forward => {
                (slot + 1 < self.file.records_per_page()).then_some(slot + 1)
            }
            ScanDirection::Backward => slot.checked_sub(1),
        }
    }

    fn next_page_state(&self, page: u64, last_page: u64) -> ScanState {
        match self.direction {
            ScanDirection::Forward if page < last_page => ScanState::At {
                page: page + 1,
                slot: 0,
            },
            ScanDirection::Backward if page > FIRST_RECORD_PAGE => ScanState::At {
                page: page - 1,
                slot: self.file.records_per_page() - 1,
            },
            _ => ScanState::Exhausted,
        }
    }
}

impl Iterator for RecordFileScan<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_rec() {
            Ok(rec) => Some(Ok(rec)),
            Err(Error::EndOfScan) => None,
            Err(Error::InvalidScan(_)) if self.state == ScanState::Closed => None,
            Err(e) => {
                self.state = ScanState::Exhausted;
                Some(Err(e))
            }
        }
    }
}
