use async_trait::async_trait;
use poolride_core::{BookingRequest, OtpChallenge, Ride, RideError, RideResult, RideStore, RideTx};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

type LockTable = Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>;

#[derive(Default)]
struct Tables {
    rides: HashMap<Uuid, Ride>,
    requests: HashMap<Uuid, BookingRequest>,
    challenges: HashMap<Uuid, OtpChallenge>,
}

/// In-process store with per-ride exclusive locks and staged writes.
///
/// Transactions buffer their writes and apply them on commit; dropping a
/// transaction discards them. Used by tests and local runs without Postgres.
#[derive(Clone)]
pub struct MemoryRideStore {
    tables: Arc<Mutex<Tables>>,
    ride_locks: LockTable,
    lock_timeout: Duration,
}

impl MemoryRideStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            ride_locks: Arc::new(Mutex::new(HashMap::new())),
            lock_timeout,
        }
    }

    fn tables(&self) -> RideResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| RideError::Store("memory store poisoned".to_string()))
    }

    fn ride_lock(&self, ride_id: Uuid) -> RideResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .ride_locks
            .lock()
            .map_err(|_| RideError::Store("memory lock table poisoned".to_string()))?;
        Ok(locks.entry(ride_id).or_default().clone())
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.ride_locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

impl Default for MemoryRideStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RideStore for MemoryRideStore {
    async fn begin(&self) -> RideResult<Box<dyn RideTx>> {
        Ok(Box::new(MemoryRideTx {
            store: self.clone(),
            held: HeldLocks { table: self.ride_locks.clone(), guards: HashMap::new() },
            rides: HashMap::new(),
            requests: HashMap::new(),
            challenges: HashMap::new(),
        }))
    }

    async fn get_ride(&self, id: Uuid) -> RideResult<Option<Ride>> {
        Ok(self.tables()?.rides.get(&id).cloned())
    }

    async fn get_request(&self, id: Uuid) -> RideResult<Option<BookingRequest>> {
        Ok(self.tables()?.requests.get(&id).cloned())
    }

    async fn list_requests(&self, ride_id: Uuid) -> RideResult<Vec<BookingRequest>> {
        let mut requests: Vec<BookingRequest> = self
            .tables()?
            .requests
            .values()
            .filter(|r| r.ride_id == ride_id)
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }

    async fn find_challenge_for_request(&self, request_id: Uuid) -> RideResult<Option<OtpChallenge>> {
        Ok(self
            .tables()?
            .challenges
            .values()
            .find(|c| c.request_id == request_id)
            .cloned())
    }
}

/// Ride locks owned by one transaction.
///
/// Released on commit or drop; lock entries nobody else is waiting on are
/// removed from the store's table at the same time.
struct HeldLocks {
    table: LockTable,
    guards: HashMap<Uuid, OwnedMutexGuard<()>>,
}

impl HeldLocks {
    fn contains(&self, ride_id: &Uuid) -> bool {
        self.guards.contains_key(ride_id)
    }
}

impl Drop for HeldLocks {
    fn drop(&mut self) {
        let released: Vec<Uuid> = self.guards.drain().map(|(id, _guard)| id).collect();
        if let Ok(mut locks) = self.table.lock() {
            for id in released {
                if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                    locks.remove(&id);
                }
            }
        }
    }
}

pub struct MemoryRideTx {
    store: MemoryRideStore,
    held: HeldLocks,
    rides: HashMap<Uuid, Ride>,
    requests: HashMap<Uuid, BookingRequest>,
    // `None` marks a deletion.
    challenges: HashMap<Uuid, Option<OtpChallenge>>,
}

impl MemoryRideTx {
    fn merged_requests(&self, ride_id: Uuid) -> RideResult<Vec<BookingRequest>> {
        let mut merged: HashMap<Uuid, BookingRequest> = self
            .store
            .tables()?
            .requests
            .values()
            .filter(|r| r.ride_id == ride_id)
            .map(|r| (r.id, r.clone()))
            .collect();
        for request in self.requests.values().filter(|r| r.ride_id == ride_id) {
            merged.insert(request.id, request.clone());
        }
        let mut requests: Vec<BookingRequest> = merged.into_values().collect();
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }

    fn merged_challenges(&self, ride_id: Uuid) -> RideResult<Vec<OtpChallenge>> {
        let mut merged: HashMap<Uuid, OtpChallenge> = self
            .store
            .tables()?
            .challenges
            .values()
            .filter(|c| c.ride_id == ride_id)
            .map(|c| (c.id, c.clone()))
            .collect();
        for (id, staged) in &self.challenges {
            match staged {
                Some(c) if c.ride_id == ride_id => {
                    merged.insert(*id, c.clone());
                }
                Some(_) => {}
                None => {
                    merged.remove(id);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    fn ensure_writable(&self, ride_id: Uuid) -> RideResult<()> {
        if self.held.contains(&ride_id) || self.rides.contains_key(&ride_id) {
            Ok(())
        } else {
            Err(RideError::Store(format!("ride {} must be locked before it is written", ride_id)))
        }
    }
}

#[async_trait]
impl RideTx for MemoryRideTx {
    async fn insert_ride(&mut self, ride: &Ride) -> RideResult<()> {
        if self.store.tables()?.rides.contains_key(&ride.id) {
            return Err(RideError::Store(format!("ride {} already exists", ride.id)));
        }
        self.rides.insert(ride.id, ride.clone());
        Ok(())
    }

    async fn lock_ride(&mut self, id: Uuid) -> RideResult<Option<Ride>> {
        if !self.held.contains(&id) && !self.rides.contains_key(&id) {
            let lock = self.store.ride_lock(id)?;
            let guard = tokio::time::timeout(self.store.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| RideError::Conflict(format!("ride {} is locked by another operation", id)))?;
            self.held.guards.insert(id, guard);
        }

        if let Some(staged) = self.rides.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.tables()?.rides.get(&id).cloned())
    }

    async fn update_ride(&mut self, ride: &Ride) -> RideResult<()> {
        self.ensure_writable(ride.id)?;
        self.rides.insert(ride.id, ride.clone());
        Ok(())
    }

    async fn get_request(&mut self, id: Uuid) -> RideResult<Option<BookingRequest>> {
        if let Some(staged) = self.requests.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.tables()?.requests.get(&id).cloned())
    }

    async fn requests_for_ride(&mut self, ride_id: Uuid) -> RideResult<Vec<BookingRequest>> {
        self.merged_requests(ride_id)
    }

    async fn insert_request(&mut self, request: &BookingRequest) -> RideResult<()> {
        self.ensure_writable(request.ride_id)?;
        self.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn update_request(&mut self, request: &BookingRequest) -> RideResult<()> {
        self.ensure_writable(request.ride_id)?;
        self.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn find_challenge(&mut self, ride_id: Uuid, passenger_id: Uuid) -> RideResult<Option<OtpChallenge>> {
        Ok(self
            .merged_challenges(ride_id)?
            .into_iter()
            .find(|c| c.passenger_id == passenger_id))
    }

    async fn challenges_for_ride(&mut self, ride_id: Uuid) -> RideResult<Vec<OtpChallenge>> {
        self.merged_challenges(ride_id)
    }

    async fn insert_challenge(&mut self, challenge: &OtpChallenge) -> RideResult<()> {
        self.ensure_writable(challenge.ride_id)?;
        if self.find_challenge(challenge.ride_id, challenge.passenger_id).await?.is_some() {
            return Err(RideError::InvalidState(format!(
                "passenger {} already has a challenge on ride {}",
                challenge.passenger_id, challenge.ride_id
            )));
        }
        self.challenges.insert(challenge.id, Some(challenge.clone()));
        Ok(())
    }

    async fn update_challenge(&mut self, challenge: &OtpChallenge) -> RideResult<()> {
        self.ensure_writable(challenge.ride_id)?;
        self.challenges.insert(challenge.id, Some(challenge.clone()));
        Ok(())
    }

    async fn delete_challenge(&mut self, id: Uuid) -> RideResult<()> {
        self.challenges.insert(id, None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RideResult<()> {
        let this = *self;
        {
            let mut tables = this.store.tables()?;
            tables.rides.extend(this.rides);
            tables.requests.extend(this.requests);
            for (id, staged) in this.challenges {
                match staged {
                    Some(challenge) => {
                        tables.challenges.insert(id, challenge);
                    }
                    None => {
                        tables.challenges.remove(&id);
                    }
                }
            }
        }
        drop(this.held);
        Ok(())
    }
}
