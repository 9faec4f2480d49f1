use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poolride_core::{
    BookingRequest, Location, OtpChallenge, Ride, RideError, RideResult, RideStore, RideTx, Route,
};
use poolride_shared::Masked;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::database::store_error;

const RIDE_COLUMNS: &str = "id, owner_id, pickup_lat, pickup_lng, pickup_address, drop_lat, drop_lng, \
     drop_address, departure_at, seats_total, seats_available, amount_per_seat, status, created_at, updated_at";

const REQUEST_COLUMNS: &str = "id, ride_id, passenger_id, owner_id, requested_seats, pickup_stop, message, \
     estimated_amount, status, created_at, updated_at";

const CHALLENGE_COLUMNS: &str = "id, ride_id, request_id, passenger_id, owner_id, pickup_code, drop_code, \
     pickup_verified, drop_verified, created_at";

#[derive(sqlx::FromRow)]
struct RideRow {
    id: Uuid,
    owner_id: Uuid,
    pickup_lat: f64,
    pickup_lng: f64,
    pickup_address: String,
    drop_lat: f64,
    drop_lng: f64,
    drop_address: String,
    departure_at: DateTime<Utc>,
    seats_total: i32,
    seats_available: i32,
    amount_per_seat: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RideRow {
    fn into_ride(self) -> RideResult<Ride> {
        Ok(Ride {
            id: self.id,
            owner_id: self.owner_id,
            route: Route {
                pickup: Location { lat: self.pickup_lat, lng: self.pickup_lng, address: self.pickup_address },
                drop: Location { lat: self.drop_lat, lng: self.drop_lng, address: self.drop_address },
            },
            departure_at: self.departure_at,
            seats_total: self.seats_total,
            seats_available: self.seats_available,
            amount_per_seat: self.amount_per_seat,
            status: self.status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: Uuid,
    ride_id: Uuid,
    passenger_id: Uuid,
    owner_id: Uuid,
    requested_seats: i32,
    pickup_stop: String,
    message: Option<String>,
    estimated_amount: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RequestRow {
    fn into_request(self) -> RideResult<BookingRequest> {
        Ok(BookingRequest {
            id: self.id,
            ride_id: self.ride_id,
            passenger_id: self.passenger_id,
            owner_id: self.owner_id,
            requested_seats: self.requested_seats,
            pickup_stop: self.pickup_stop,
            message: self.message,
            estimated_amount: self.estimated_amount,
            status: self.status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChallengeRow {
    id: Uuid,
    ride_id: Uuid,
    request_id: Uuid,
    passenger_id: Uuid,
    owner_id: Uuid,
    pickup_code: String,
    drop_code: String,
    pickup_verified: bool,
    drop_verified: bool,
    created_at: DateTime<Utc>,
}

impl From<ChallengeRow> for OtpChallenge {
    fn from(row: ChallengeRow) -> Self {
        Self {
            id: row.id,
            ride_id: row.ride_id,
            request_id: row.request_id,
            passenger_id: row.passenger_id,
            owner_id: row.owner_id,
            pickup_code: Masked::new(row.pickup_code),
            drop_code: Masked::new(row.drop_code),
            pickup_verified: row.pickup_verified,
            drop_verified: row.drop_verified,
            created_at: row.created_at,
        }
    }
}

fn into_requests(rows: Vec<RequestRow>) -> RideResult<Vec<BookingRequest>> {
    rows.into_iter().map(RequestRow::into_request).collect()
}

/// Postgres-backed ride store. Ride locks are row locks (`SELECT ... FOR UPDATE`)
/// bounded by a per-transaction `lock_timeout`.
#[derive(Clone)]
pub struct PgRideStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgRideStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl RideStore for PgRideStore {
    async fn begin(&self) -> RideResult<Box<dyn RideTx>> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // SET does not take bind parameters; the value is an integer we format ourselves.
        let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis().max(1));
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        Ok(Box::new(PgRideTx { tx }))
    }

    async fn get_ride(&self, id: Uuid) -> RideResult<Option<Ride>> {
        let sql = format!("SELECT {} FROM rides WHERE id = $1", RIDE_COLUMNS);
        sqlx::query_as::<_, RideRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(RideRow::into_ride)
            .transpose()
    }

    async fn get_request(&self, id: Uuid) -> RideResult<Option<BookingRequest>> {
        let sql = format!("SELECT {} FROM booking_requests WHERE id = $1", REQUEST_COLUMNS);
        sqlx::query_as::<_, RequestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(RequestRow::into_request)
            .transpose()
    }

    async fn list_requests(&self, ride_id: Uuid) -> RideResult<Vec<BookingRequest>> {
        let sql = format!(
            "SELECT {} FROM booking_requests WHERE ride_id = $1 ORDER BY created_at",
            REQUEST_COLUMNS
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(ride_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        into_requests(rows)
    }

    async fn find_challenge_for_request(&self, request_id: Uuid) -> RideResult<Option<OtpChallenge>> {
        let sql = format!("SELECT {} FROM otp_challenges WHERE request_id = $1", CHALLENGE_COLUMNS);
        let row = sqlx::query_as::<_, ChallengeRow>(&sql)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(OtpChallenge::from))
    }
}

pub struct PgRideTx {
    tx: Transaction<'static, Postgres>,
}

fn expect_one(rows_affected: u64, entity: &'static str, id: Uuid) -> RideResult<()> {
    if rows_affected == 0 {
        return Err(RideError::not_found(entity, id));
    }
    Ok(())
}

#[async_trait]
impl RideTx for PgRideTx {
    async fn insert_ride(&mut self, ride: &Ride) -> RideResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rides (id, owner_id, pickup_lat, pickup_lng, pickup_address, drop_lat, drop_lng,
                               drop_address, departure_at, seats_total, seats_available, amount_per_seat,
                               status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(ride.id)
        .bind(ride.owner_id)
        .bind(ride.route.pickup.lat)
        .bind(ride.route.pickup.lng)
        .bind(&ride.route.pickup.address)
        .bind(ride.route.drop.lat)
        .bind(ride.route.drop.lng)
        .bind(&ride.route.drop.address)
        .bind(ride.departure_at)
        .bind(ride.seats_total)
        .bind(ride.seats_available)
        .bind(ride.amount_per_seat)
        .bind(ride.status.as_str())
        .bind(ride.created_at)
        .bind(ride.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn lock_ride(&mut self, id: Uuid) -> RideResult<Option<Ride>> {
        let sql = format!("SELECT {} FROM rides WHERE id = $1 FOR UPDATE", RIDE_COLUMNS);
        sqlx::query_as::<_, RideRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .map(RideRow::into_ride)
            .transpose()
    }

    async fn update_ride(&mut self, ride: &Ride) -> RideResult<()> {
        let result = sqlx::query(
            "UPDATE rides SET seats_available = $2, status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(ride.id)
        .bind(ride.seats_available)
        .bind(ride.status.as_str())
        .bind(ride.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        expect_one(result.rows_affected(), "ride", ride.id)
    }

    async fn get_request(&mut self, id: Uuid) -> RideResult<Option<BookingRequest>> {
        let sql = format!("SELECT {} FROM booking_requests WHERE id = $1", REQUEST_COLUMNS);
        sqlx::query_as::<_, RequestRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .map(RequestRow::into_request)
            .transpose()
    }

    async fn requests_for_ride(&mut self, ride_id: Uuid) -> RideResult<Vec<BookingRequest>> {
        let sql = format!(
            "SELECT {} FROM booking_requests WHERE ride_id = $1 ORDER BY created_at",
            REQUEST_COLUMNS
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(ride_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(store_error)?;
        into_requests(rows)
    }

    async fn insert_request(&mut self, request: &BookingRequest) -> RideResult<()> {
        sqlx::query(
            r#"
            INSERT INTO booking_requests (id, ride_id, passenger_id, owner_id, requested_seats, pickup_stop,
                                          message, estimated_amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(request.id)
        .bind(request.ride_id)
        .bind(request.passenger_id)
        .bind(request.owner_id)
        .bind(request.requested_seats)
        .bind(&request.pickup_stop)
        .bind(&request.message)
        .bind(request.estimated_amount)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn update_request(&mut self, request: &BookingRequest) -> RideResult<()> {
        let result = sqlx::query("UPDATE booking_requests SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(request.id)
            .bind(request.status.as_str())
            .bind(request.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        expect_one(result.rows_affected(), "booking request", request.id)
    }

    async fn find_challenge(&mut self, ride_id: Uuid, passenger_id: Uuid) -> RideResult<Option<OtpChallenge>> {
        let sql = format!(
            "SELECT {} FROM otp_challenges WHERE ride_id = $1 AND passenger_id = $2",
            CHALLENGE_COLUMNS
        );
        let row = sqlx::query_as::<_, ChallengeRow>(&sql)
            .bind(ride_id)
            .bind(passenger_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(row.map(OtpChallenge::from))
    }

    async fn challenges_for_ride(&mut self, ride_id: Uuid) -> RideResult<Vec<OtpChallenge>> {
        let sql = format!("SELECT {} FROM otp_challenges WHERE ride_id = $1", CHALLENGE_COLUMNS);
        let rows = sqlx::query_as::<_, ChallengeRow>(&sql)
            .bind(ride_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(OtpChallenge::from).collect())
    }

    async fn insert_challenge(&mut self, challenge: &OtpChallenge) -> RideResult<()> {
        sqlx::query(
            r#"
            INSERT INTO otp_challenges (id, ride_id, request_id, passenger_id, owner_id, pickup_code, drop_code,
                                        pickup_verified, drop_verified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(challenge.id)
        .bind(challenge.ride_id)
        .bind(challenge.request_id)
        .bind(challenge.passenger_id)
        .bind(challenge.owner_id)
        .bind(challenge.pickup_code.expose())
        .bind(challenge.drop_code.expose())
        .bind(challenge.pickup_verified)
        .bind(challenge.drop_verified)
        .bind(challenge.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn update_challenge(&mut self, challenge: &OtpChallenge) -> RideResult<()> {
        let result = sqlx::query(
            "UPDATE otp_challenges SET pickup_verified = $2, drop_verified = $3 WHERE id = $1",
        )
        .bind(challenge.id)
        .bind(challenge.pickup_verified)
        .bind(challenge.drop_verified)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        expect_one(result.rows_affected(), "otp challenge", challenge.id)
    }

    async fn delete_challenge(&mut self, id: Uuid) -> RideResult<()> {
        sqlx::query("DELETE FROM otp_challenges WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RideResult<()> {
        self.tx.commit().await.map_err(store_error)
    }
}
