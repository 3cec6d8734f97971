//! An in-memory [`RawReportChannel`] recording every call, used by the unit
//! tests.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    time::Duration,
};

use thiserror::Error;

use crate::channel::{RawReportChannel, ReportType, UsageEvent};

#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) enum Call {
    SetUsages(u8, Vec<i32>),
    Commit(u8),
    Request(u8),
    GetUsages(u8, usize),
    Wait(Option<Duration>),
    Read,
}

#[derive(Debug, Error)]
#[error("mock channel rejected {0}")]
pub(crate) struct MockError(&'static str);

/// Simulates a device that queues `acks` events whenever a report is
/// committed or requested.
#[derive(Debug)]
pub(crate) struct MockChannel {
    calls: RefCell<Vec<Call>>,
    pending: RefCell<VecDeque<UsageEvent>>,
    input: RefCell<HashMap<u8, Vec<i32>>>,
    acks: usize,
    fail_on: Option<&'static str>,
}

impl MockChannel {
    pub(crate) fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            pending: RefCell::new(VecDeque::new()),
            input: RefCell::new(HashMap::new()),
            acks: 1,
            fail_on: None,
        }
    }

    pub(crate) fn with_acks(mut self, acks: usize) -> Self {
        self.acks = acks;
        self
    }

    pub(crate) fn failing_on(mut self, op: &'static str) -> Self {
        self.fail_on = Some(op);
        self
    }

    /// Sets the values the next [`RawReportChannel::get_usages`] call
    /// returns for the given report.
    pub(crate) fn set_input(&self, report_id: u8, values: Vec<i32>) {
        self.input.borrow_mut().insert(report_id, values);
    }

    pub(crate) fn queue_event(&self, event: UsageEvent) {
        self.pending.borrow_mut().push_back(event);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Returns only the values written via `set_usages`.
    pub(crate) fn sent(&self) -> Vec<(u8, Vec<i32>)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::SetUsages(id, values) => Some((*id, values.clone())),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    fn record(&self, call: Call, op: &'static str) -> Result<(), MockError> {
        self.calls.borrow_mut().push(call);

        if self.fail_on == Some(op) {
            return Err(MockError(op));
        }

        Ok(())
    }

    fn acknowledge(&self, report_id: u8) {
        for i in 0..self.acks {
            self.queue_event(UsageEvent {
                report_type: ReportType::Input.into(),
                report_id: report_id.into(),
                field_index: 0,
                usage_index: i as u32,
                usage_code: 0xff00_0001,
                value: 0,
            });
        }
    }
}

impl RawReportChannel for MockChannel {
    type Error = MockError;

    fn set_usages(&self, report_id: u8, values: &[i32]) -> Result<(), Self::Error> {
        self.record(Call::SetUsages(report_id, values.to_vec()), "set")
    }

    fn commit_report(&self, report_id: u8) -> Result<(), Self::Error> {
        self.record(Call::Commit(report_id), "commit")?;
        self.acknowledge(report_id);
        Ok(())
    }

    fn request_report(&self, report_id: u8) -> Result<(), Self::Error> {
        self.record(Call::Request(report_id), "request")?;
        self.acknowledge(report_id);
        Ok(())
    }

    fn get_usages(&self, report_id: u8, buf: &mut [i32]) -> Result<(), Self::Error> {
        self.record(Call::GetUsages(report_id, buf.len()), "get")?;

        let values = self
            .input
            .borrow()
            .get(&report_id)
            .cloned()
            .unwrap_or_default();
        for (dst, src) in buf.iter_mut().zip(values) {
            *dst = src;
        }

        Ok(())
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool, Self::Error> {
        self.record(Call::Wait(timeout), "wait")?;
        Ok(!self.pending.borrow().is_empty())
    }

    fn read_event(&self) -> Result<Option<UsageEvent>, Self::Error> {
        self.record(Call::Read, "read")?;
        Ok(self.pending.borrow_mut().pop_front())
    }
}
