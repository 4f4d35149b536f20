//! Shared harness for the integration tests: in-memory stores, a manual
//! clock and scripted remote collaborators.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::Duration;
use cinema_core::{AuditoriumId, Clock, Error, Money, MovieId, Result, ShowtimeId, UserId};
use cinema_testing::helpers::{init_test_tracing, seat_labels};
use cinema_testing::{ManualClock, test_clock_start};
use cinema_ticketing::bootstrap::{Components, Resources};
use cinema_ticketing::config::{LoyaltyConfig, WorkflowConfig};
use cinema_ticketing::gateway::{
    AuthSession, CINEMA_SERVICE, Catalog, Cinema, CinemaInput, Gateway, Identity, MOVIE_SERVICE,
    Movie, MovieInput, Role, USER_SERVICE, UserDirectory,
};
use cinema_ticketing::types::{NewShowtime, SeatLayout};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Id of the admin account behind `Bearer admin`.
pub const ADMIN_ID: i64 = 1;

/// `Authorization` value for user `id`.
pub fn bearer(id: i64) -> String {
    format!("Bearer user-{id}")
}

/// `Authorization` value for the admin.
pub fn admin_bearer() -> String {
    "Bearer admin".to_string()
}

/// User directory that accepts `Bearer user-<id>` and `Bearer admin`.
#[derive(Default)]
pub struct ScriptedDirectory {
    down: AtomicBool,
}

impl ScriptedDirectory {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check_up(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(Error::unavailable(USER_SERVICE))
        } else {
            Ok(())
        }
    }
}

pub fn identity(id: i64) -> Identity {
    Identity {
        user_id: UserId::new(id),
        username: format!("user{id}"),
        email: format!("user{id}@example.com"),
        role: if id == ADMIN_ID { Role::Admin } else { Role::User },
    }
}

#[async_trait]
impl UserDirectory for ScriptedDirectory {
    async fn register(&self, username: &str, email: &str, _password: &str) -> Result<AuthSession> {
        self.check_up()?;
        Ok(AuthSession {
            token: "user-42".into(),
            user: Identity {
                user_id: UserId::new(42),
                username: username.into(),
                email: email.into(),
                role: Role::User,
            },
        })
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.check_up()?;
        if password != "secret" {
            return Err(Error::BadInput("invalid credentials".into()));
        }
        Ok(AuthSession {
            token: "user-42".into(),
            user: Identity {
                email: email.into(),
                ..identity(42)
            },
        })
    }

    async fn verify(&self, authorization: &str) -> Result<Identity> {
        self.check_up()?;
        let token = authorization
            .strip_prefix("Bearer ")
            .ok_or(Error::InvalidToken)?;
        if token == "admin" {
            return Ok(identity(ADMIN_ID));
        }
        token
            .strip_prefix("user-")
            .and_then(|id| id.parse::<i64>().ok())
            .map(identity)
            .ok_or(Error::InvalidToken)
    }

    async fn users(&self, authorization: &str) -> Result<Vec<Identity>> {
        let caller = self.verify(authorization).await?;
        if !caller.is_admin() {
            return Err(Error::Forbidden("admin role required".into()));
        }
        Ok(vec![identity(ADMIN_ID), identity(2), identity(3)])
    }
}

/// Catalog with one movie and one cinema; either service can be taken down.
#[derive(Default)]
pub struct ScriptedCatalog {
    movies_down: AtomicBool,
    cinemas_down: AtomicBool,
}

impl ScriptedCatalog {
    pub fn set_movies_down(&self, down: bool) {
        self.movies_down.store(down, Ordering::SeqCst);
    }

    pub fn set_cinemas_down(&self, down: bool) {
        self.cinemas_down.store(down, Ordering::SeqCst);
    }

    fn movie(id: &str, input: &MovieInput) -> Movie {
        Movie {
            id: id.into(),
            title: input.title.clone().unwrap_or_default(),
            description: input.description.clone(),
            genre: input.genre.clone(),
            duration: input.duration,
            release_date: input.release_date.clone(),
        }
    }

    fn cinema(id: &str, input: &CinemaInput) -> Cinema {
        Cinema {
            id: id.into(),
            name: input.name.clone().unwrap_or_default(),
            location: input.location.clone(),
            city: input.city.clone(),
        }
    }

    fn movies_up(&self) -> Result<()> {
        if self.movies_down.load(Ordering::SeqCst) {
            Err(Error::unavailable(MOVIE_SERVICE))
        } else {
            Ok(())
        }
    }

    fn cinemas_up(&self) -> Result<()> {
        if self.cinemas_down.load(Ordering::SeqCst) {
            Err(Error::unavailable(CINEMA_SERVICE))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Catalog for ScriptedCatalog {
    async fn movies(&self, _authorization: Option<&str>) -> Result<Vec<Movie>> {
        self.movies_up()?;
        Ok(vec![Movie {
            id: "1".into(),
            title: "Arrival".into(),
            description: None,
            genre: Some("Sci-Fi".into()),
            duration: Some(116),
            release_date: Some("2016-11-11".into()),
        }])
    }

    async fn cinemas(&self, _authorization: Option<&str>) -> Result<Vec<Cinema>> {
        self.cinemas_up()?;
        Ok(vec![Cinema {
            id: "1".into(),
            name: "Grand".into(),
            location: Some("Main St".into()),
            city: Some("Jakarta".into()),
        }])
    }

    async fn create_movie(&self, input: &MovieInput, _authorization: &str) -> Result<Movie> {
        self.movies_up()?;
        Ok(Self::movie("2", input))
    }

    async fn update_movie(&self, id: &str, input: &MovieInput, _authorization: &str) -> Result<Movie> {
        self.movies_up()?;
        Ok(Self::movie(id, input))
    }

    async fn delete_movie(&self, _id: &str, _authorization: &str) -> Result<bool> {
        self.movies_up()?;
        Ok(true)
    }

    async fn create_cinema(&self, input: &CinemaInput, _authorization: &str) -> Result<Cinema> {
        self.cinemas_up()?;
        Ok(Self::cinema("2", input))
    }

    async fn update_cinema(
        &self,
        id: &str,
        input: &CinemaInput,
        _authorization: &str,
    ) -> Result<Cinema> {
        self.cinemas_up()?;
        Ok(Self::cinema(id, input))
    }

    async fn delete_cinema(&self, _id: &str, _authorization: &str) -> Result<bool> {
        self.cinemas_up()?;
        Ok(true)
    }
}

/// Everything a workflow test needs.
pub struct Harness {
    pub clock: ManualClock,
    pub components: Components,
    pub gateway: Gateway,
    pub users: Arc<ScriptedDirectory>,
    pub catalog: Arc<ScriptedCatalog>,
}

impl Harness {
    /// In-memory harness with default deadlines and loyalty schedule.
    pub fn new() -> Self {
        Self::with_resources(Resources::in_memory())
    }

    /// Harness over the given stores.
    pub fn with_resources(resources: Resources) -> Self {
        init_test_tracing();
        let clock = ManualClock::new(test_clock_start());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let components = Components::new(
            &resources,
            shared,
            &WorkflowConfig::default(),
            LoyaltyConfig::default(),
        );
        let users = Arc::new(ScriptedDirectory::default());
        let catalog = Arc::new(ScriptedCatalog::default());
        let gateway = components.gateway(users.clone(), catalog.clone());

        Self {
            clock,
            components,
            gateway,
            users,
            catalog,
        }
    }

    /// Publishes a showtime with seats `A1..E10` at `price` dollars per seat.
    pub async fn showtime(&self, price: u64) -> ShowtimeId {
        self.components
            .inventory
            .publish_showtime(
                NewShowtime {
                    movie_id: MovieId::new(1),
                    auditorium_id: AuditoriumId::new(1),
                    start_time: test_clock_start() + Duration::days(7),
                    unit_price: Money::from_dollars(price),
                },
                &SeatLayout::Explicit(seat_labels(5, 10)),
            )
            .await
            .expect("showtime")
            .id
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

/// Owned seat labels.
pub fn seats(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|s| (*s).to_string()).collect()
}
