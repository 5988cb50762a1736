//! In-memory history of historizing variables

use crate::address_space::AddressSpace;
use crate::server::Server;
use chrono::{DateTime, Utc};
use opcua_core::{DataValue, NodeId, StatusCode, UaResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How UpdateData treats existing entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum PerformUpdateType {
    Insert = 1,
    Replace = 2,
    Update = 3,
    Remove = 4,
}

/// One HistoryUpdate operation
#[derive(Debug, Clone)]
pub enum HistoryUpdateDetails {
    UpdateData {
        node_id: NodeId,
        perform_insert_replace: PerformUpdateType,
        update_values: Vec<DataValue>,
    },
    DeleteRawModified {
        node_id: NodeId,
        is_delete_modified: bool,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
}

impl HistoryUpdateDetails {
    pub fn node_id(&self) -> &NodeId {
        match self {
            HistoryUpdateDetails::UpdateData { node_id, .. }
            | HistoryUpdateDetails::DeleteRawModified { node_id, .. } => node_id,
        }
    }
}

/// Outcome of one HistoryUpdate operation
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryUpdateResult {
    pub status_code: StatusCode,
    /// One entry per update value (UpdateData only)
    pub operation_results: Vec<StatusCode>,
}

impl HistoryUpdateResult {
    pub(crate) fn failed(status_code: StatusCode) -> Self {
        Self {
            status_code,
            operation_results: Vec::new(),
        }
    }
}

/// Per-node time series ordered by source timestamp
#[derive(Debug, Default)]
pub struct HistoryStore {
    series: HashMap<NodeId, BTreeMap<DateTime<Utc>, DataValue>>,
}

fn timestamp_of(value: &DataValue) -> DateTime<Utc> {
    value.source_timestamp.unwrap_or_else(Utc::now)
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value written to a historizing variable
    ///
    /// A value with the same source timestamp replaces the stored one.
    pub fn record(&mut self, node_id: &NodeId, value: DataValue) {
        let ts = timestamp_of(&value);
        self.series.entry(node_id.clone()).or_default().insert(ts, value);
    }

    /// Apply an UpdateData operation
    ///
    /// # Returns
    /// One status per value
    ///
    /// # Errors
    /// `BadHistoryOperationUnsupported` for [`PerformUpdateType::Remove`]
    pub fn update_data(
        &mut self,
        node_id: &NodeId,
        mode: PerformUpdateType,
        values: &[DataValue],
    ) -> UaResult<Vec<StatusCode>> {
        if mode == PerformUpdateType::Remove {
            return Err(StatusCode::BAD_HISTORY_OPERATION_UNSUPPORTED.into());
        }
        let series = self.series.entry(node_id.clone()).or_default();
        let results = values
            .iter()
            .map(|value| {
                let ts = timestamp_of(value);
                let exists = series.contains_key(&ts);
                match (mode, exists) {
                    (PerformUpdateType::Insert, true) => StatusCode::BAD_ENTRY_EXISTS,
                    (PerformUpdateType::Replace, false) => StatusCode::BAD_NO_ENTRY_EXISTS,
                    _ => {
                        series.insert(ts, value.clone());
                        StatusCode::GOOD
                    }
                }
            })
            .collect();
        Ok(results)
    }

    /// Remove values with a source timestamp in `[start, end)`
    ///
    /// # Returns
    /// Number of removed values
    pub fn delete_raw(&mut self, node_id: &NodeId, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
        let Some(series) = self.series.get_mut(node_id) else {
            return 0;
        };
        if start >= end {
            return 0;
        }
        let doomed: Vec<_> = series.range(start..end).map(|(ts, _)| *ts).collect();
        for ts in &doomed {
            series.remove(ts);
        }
        doomed.len()
    }

    /// Values with a source timestamp in `[start, end)`, oldest first
    ///
    /// `max_values` of 0 means no limit.
    pub fn read_raw(
        &self,
        node_id: &NodeId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_values: usize,
    ) -> Vec<DataValue> {
        let Some(series) = self.series.get(node_id) else {
            return Vec::new();
        };
        if start >= end {
            return Vec::new();
        }
        let limit = if max_values == 0 { usize::MAX } else { max_values };
        series.range(start..end).take(limit).map(|(_, v)| v.clone()).collect()
    }

    /// Forget the series of a deleted node
    pub fn remove_node(&mut self, node_id: &NodeId) {
        self.series.remove(node_id);
    }

    /// Number of values stored for a node
    pub fn len(&self, node_id: &NodeId) -> usize {
        self.series.get(node_id).map_or(0, BTreeMap::len)
    }
}

impl Server {
    /// Apply one HistoryUpdate operation under an already held lock
    pub(crate) fn history_update_locked(
        &self,
        space: &AddressSpace,
        details: &HistoryUpdateDetails,
    ) -> HistoryUpdateResult {
        let node_id = details.node_id();
        match space.find(node_id) {
            Err(e) => return HistoryUpdateResult::failed(e.status_code()),
            Ok(node) if !node.is_historizing() => {
                return HistoryUpdateResult::failed(StatusCode::BAD_HISTORY_OPERATION_UNSUPPORTED);
            }
            Ok(_) => {}
        }
        let mut store = self.history.lock();
        match details {
            HistoryUpdateDetails::UpdateData {
                perform_insert_replace,
                update_values,
                ..
            } => match store.update_data(node_id, *perform_insert_replace, update_values) {
                Ok(operation_results) => HistoryUpdateResult {
                    status_code: StatusCode::GOOD,
                    operation_results,
                },
                Err(e) => HistoryUpdateResult::failed(e.status_code()),
            },
            HistoryUpdateDetails::DeleteRawModified {
                is_delete_modified: true,
                ..
            } => HistoryUpdateResult::failed(StatusCode::BAD_HISTORY_OPERATION_UNSUPPORTED),
            HistoryUpdateDetails::DeleteRawModified {
                start_time,
                end_time,
                ..
            } => {
                let removed = store.delete_raw(node_id, *start_time, *end_time);
                log::debug!("Deleted {} history values of {}", removed, node_id);
                HistoryUpdateResult {
                    status_code: StatusCode::GOOD,
                    operation_results: Vec::new(),
                }
            }
        }
    }

    /// Update the stored history of a historizing variable
    pub async fn history_update(&self, details: &HistoryUpdateDetails) -> HistoryUpdateResult {
        let result = {
            let space = self.space.write().await;
            self.history_update_locked(&space, details)
        };
        self.last_error.set(result.status_code);
        result
    }

    /// Stored values of a historizing variable in `[start, end)`, oldest first
    ///
    /// # Errors
    /// - `BadNodeIdUnknown` if the node does not exist
    /// - `BadHistoryOperationUnsupported` if the node is not historizing
    pub async fn read_history(
        &self,
        node_id: &NodeId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_values: usize,
    ) -> UaResult<Vec<DataValue>> {
        let result = {
            let space = self.space.write().await;
            space.find(node_id).and_then(|node| {
                if node.is_historizing() {
                    Ok(self.history.lock().read_raw(node_id, start, end, max_values))
                } else {
                    Err(StatusCode::BAD_HISTORY_OPERATION_UNSUPPORTED.into())
                }
            })
        };
        self.record(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn test_update_modes() {
        let node = NodeId::numeric(1, 1);
        let mut store = HistoryStore::new();
        store.record(&node, DataValue::new_at(1.0f64, at(0)));

        let results = store
            .update_data(
                &node,
                PerformUpdateType::Insert,
                &[DataValue::new_at(2.0f64, at(0)), DataValue::new_at(3.0f64, at(1))],
            )
            .unwrap();
        assert_eq!(results, vec![StatusCode::BAD_ENTRY_EXISTS, StatusCode::GOOD]);

        let results = store
            .update_data(
                &node,
                PerformUpdateType::Replace,
                &[DataValue::new_at(4.0f64, at(0)), DataValue::new_at(5.0f64, at(9))],
            )
            .unwrap();
        assert_eq!(results, vec![StatusCode::GOOD, StatusCode::BAD_NO_ENTRY_EXISTS]);

        let results = store
            .update_data(&node, PerformUpdateType::Update, &[DataValue::new_at(6.0f64, at(9))])
            .unwrap();
        assert_eq!(results, vec![StatusCode::GOOD]);
        assert_eq!(store.len(&node), 3);

        let err = store
            .update_data(&node, PerformUpdateType::Remove, &[])
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_HISTORY_OPERATION_UNSUPPORTED);
    }

    #[test]
    fn test_read_and_delete_range() {
        let node = NodeId::numeric(1, 1);
        let mut store = HistoryStore::new();
        for minute in 0..5 {
            store.record(&node, DataValue::new_at(minute as i32, at(minute)));
        }
        let values = store.read_raw(&node, at(1), at(4), 0);
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].value.as_i32().unwrap(), 1);
        assert_eq!(store.read_raw(&node, at(0), at(5), 2).len(), 2);

        assert_eq!(store.delete_raw(&node, at(1), at(3)), 2);
        assert_eq!(store.len(&node), 3);
        assert_eq!(store.delete_raw(&node, at(3), at(3) - Duration::minutes(1)), 0);
    }

    mod server {
        use crate::config::ServerConfig;
        use crate::history::{HistoryUpdateDetails, PerformUpdateType};
        use crate::runtime::Runtime;
        use chrono::{Duration, Utc};
        use opcua_core::{ids, DataValue, NodeId, StatusCode};

        #[tokio::test]
        async fn test_history_update_on_variables() {
            let server = Runtime::new().create_server(ServerConfig::default());
            let temp = server
                .add_historical_variable(&ids::objects_folder(), "Temp", 1.0f64, &NodeId::null(), None, 0)
                .await
                .unwrap();
            let now = Utc::now();
            let update = HistoryUpdateDetails::UpdateData {
                node_id: temp.clone(),
                perform_insert_replace: PerformUpdateType::Insert,
                update_values: vec![
                    DataValue::new_at(1.0f64, now - Duration::minutes(2)),
                    DataValue::new_at(2.0f64, now - Duration::minutes(1)),
                ],
            };
            let result = server.history_update(&update).await;
            assert_eq!(result.status_code, StatusCode::GOOD);
            assert_eq!(result.operation_results, vec![StatusCode::GOOD; 2]);

            let values = server
                .read_history(&temp, now - Duration::hours(1), now, 0)
                .await
                .unwrap();
            assert_eq!(values.len(), 2);

            let delete = HistoryUpdateDetails::DeleteRawModified {
                node_id: temp.clone(),
                is_delete_modified: false,
                start_time: now - Duration::hours(1),
                end_time: now - Duration::seconds(90),
            };
            assert_eq!(server.history_update(&delete).await.status_code, StatusCode::GOOD);
            let values = server
                .read_history(&temp, now - Duration::hours(1), now, 0)
                .await
                .unwrap();
            assert_eq!(values.len(), 1);

            let modified = HistoryUpdateDetails::DeleteRawModified {
                node_id: temp.clone(),
                is_delete_modified: true,
                start_time: now - Duration::hours(1),
                end_time: now,
            };
            assert_eq!(
                server.history_update(&modified).await.status_code,
                StatusCode::BAD_HISTORY_OPERATION_UNSUPPORTED
            );
        }

        #[tokio::test]
        async fn test_history_requires_historizing_node() {
            let server = Runtime::new().create_server(ServerConfig::default());
            let plain = server
                .add_variable(&ids::objects_folder(), "Plain", 1i32, &NodeId::null(), None, 0)
                .await
                .unwrap();
            let update = HistoryUpdateDetails::UpdateData {
                node_id: plain.clone(),
                perform_insert_replace: PerformUpdateType::Update,
                update_values: vec![DataValue::new_now(2i32)],
            };
            assert_eq!(
                server.history_update(&update).await.status_code,
                StatusCode::BAD_HISTORY_OPERATION_UNSUPPORTED
            );
            let now = Utc::now();
            let err = server
                .read_history(&plain, now - Duration::hours(1), now, 0)
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_HISTORY_OPERATION_UNSUPPORTED);

            let missing = HistoryUpdateDetails::UpdateData {
                node_id: NodeId::numeric(1, 777_777),
                perform_insert_replace: PerformUpdateType::Update,
                update_values: Vec::new(),
            };
            assert_eq!(
                server.history_update(&missing).await.status_code,
                StatusCode::BAD_NODE_ID_UNKNOWN
            );
        }
    }
}
