//! Remote collaborators: the user service and the movie/cinema catalog.

use super::auth::{AuthSession, Identity, Role, UserDirectory};
use super::downstream::{RemoteService, flexible_id};
use async_trait::async_trait;
use cinema_core::{Error, Result, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;

// ============================================================================
// User service
// ============================================================================

const USER_FIELDS: &str = "id username email role";

#[derive(Deserialize)]
struct RemoteUser {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    role: Option<String>,
}

impl TryFrom<RemoteUser> for Identity {
    type Error = Error;

    fn try_from(user: RemoteUser) -> Result<Self> {
        let user_id = user
            .id
            .parse::<UserId>()
            .map_err(|_| Error::unavailable("user service"))?;
        Ok(Self {
            user_id,
            username: user.username,
            email: user.email,
            role: user.role.as_deref().map_or(Role::User, Role::from_label),
        })
    }
}

#[derive(Deserialize)]
struct RemoteAuthPayload {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<RemoteUser>,
}

impl RemoteAuthPayload {
    fn into_session(self) -> Result<AuthSession> {
        let rejection = || {
            Error::BadInput(
                self.error
                    .clone()
                    .unwrap_or_else(|| "authentication failed".to_string()),
            )
        };
        if self.success == Some(false) {
            return Err(rejection());
        }
        match (self.token.clone(), self.user) {
            (Some(token), Some(user)) if !token.is_empty() => Ok(AuthSession {
                token,
                user: user.try_into()?,
            }),
            _ => Err(Error::BadInput(
                self.error
                    .unwrap_or_else(|| "authentication failed".to_string()),
            )),
        }
    }
}

#[derive(Deserialize)]
struct RegisterData {
    register: RemoteAuthPayload,
}

#[derive(Deserialize)]
struct LoginData {
    login: RemoteAuthPayload,
}

#[derive(Deserialize)]
struct MeData {
    me: Option<RemoteUser>,
}

#[derive(Deserialize)]
struct UsersData {
    users: Vec<RemoteUser>,
}

/// [`UserDirectory`] backed by the user service's GraphQL API.
pub struct RemoteUserDirectory {
    service: RemoteService,
}

impl RemoteUserDirectory {
    /// Directory over `service`
    #[must_use]
    pub const fn new(service: RemoteService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl UserDirectory for RemoteUserDirectory {
    async fn register(&self, username: &str, email: &str, password: &str) -> Result<AuthSession> {
        let query = format!(
            "mutation Register($username: String!, $email: String!, $password: String!) {{ \
             register(username: $username, email: $email, password: $password) \
             {{ success error token user {{ {USER_FIELDS} }} }} }}"
        );
        let data: RegisterData = self
            .service
            .query(
                &query,
                json!({ "username": username, "email": email, "password": password }),
                None,
            )
            .await?;
        data.register.into_session()
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        let query = format!(
            "mutation Login($email: String!, $password: String!) {{ \
             login(email: $email, password: $password) \
             {{ success error token user {{ {USER_FIELDS} }} }} }}"
        );
        let data: LoginData = self
            .service
            .query(&query, json!({ "email": email, "password": password }), None)
            .await?;
        data.login.into_session()
    }

    async fn verify(&self, authorization: &str) -> Result<Identity> {
        let query = format!("query Me {{ me {{ {USER_FIELDS} }} }}");
        let data: MeData = self
            .service
            .query(&query, json!({}), Some(authorization))
            .await?;
        data.me.ok_or(Error::InvalidToken)?.try_into()
    }

    async fn users(&self, authorization: &str) -> Result<Vec<Identity>> {
        let query = format!("query Users {{ users {{ {USER_FIELDS} }} }}");
        let data: UsersData = self
            .service
            .query(&query, json!({}), Some(authorization))
            .await?;
        data.users.into_iter().map(Identity::try_from).collect()
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// A movie held by the movie service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, async_graphql::SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    /// Movie id
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    /// Title
    pub title: String,
    /// Synopsis
    #[serde(default)]
    pub description: Option<String>,
    /// Genre
    #[serde(default)]
    pub genre: Option<String>,
    /// Running time in minutes
    #[serde(default)]
    pub duration: Option<i32>,
    /// Release date as sent by the movie service
    #[serde(default)]
    pub release_date: Option<String>,
}

/// A cinema held by the cinema service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, async_graphql::SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct Cinema {
    /// Cinema id
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    /// Name
    pub name: String,
    /// Street address or area
    #[serde(default)]
    pub location: Option<String>,
    /// City
    #[serde(default)]
    pub city: Option<String>,
}

/// Admin input for creating or updating a movie.
#[derive(Clone, Debug, Default, PartialEq, Serialize, async_graphql::InputObject)]
#[serde(rename_all = "camelCase")]
pub struct MovieInput {
    /// Title
    pub title: Option<String>,
    /// Synopsis
    pub description: Option<String>,
    /// Genre
    pub genre: Option<String>,
    /// Running time in minutes
    pub duration: Option<i32>,
    /// Release date
    pub release_date: Option<String>,
}

/// Admin input for creating or updating a cinema.
#[derive(Clone, Debug, Default, PartialEq, Serialize, async_graphql::InputObject)]
#[serde(rename_all = "camelCase")]
pub struct CinemaInput {
    /// Name
    pub name: Option<String>,
    /// Street address or area
    pub location: Option<String>,
    /// City
    pub city: Option<String>,
}

/// The movie and cinema collaborators.
///
/// Mutations carry the caller's `Authorization` header so the owning service
/// can apply its own checks.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All movies.
    ///
    /// # Errors
    ///
    /// Availability errors when the movie service cannot answer.
    async fn movies(&self, authorization: Option<&str>) -> Result<Vec<Movie>>;

    /// All cinemas.
    ///
    /// # Errors
    ///
    /// Availability errors when the cinema service cannot answer.
    async fn cinemas(&self, authorization: Option<&str>) -> Result<Vec<Cinema>>;

    /// Creates a movie.
    ///
    /// # Errors
    ///
    /// Propagates the movie service's error.
    async fn create_movie(&self, input: &MovieInput, authorization: &str) -> Result<Movie>;

    /// Updates a movie.
    ///
    /// # Errors
    ///
    /// Propagates the movie service's error.
    async fn update_movie(&self, id: &str, input: &MovieInput, authorization: &str) -> Result<Movie>;

    /// Deletes a movie.
    ///
    /// # Errors
    ///
    /// Propagates the movie service's error.
    async fn delete_movie(&self, id: &str, authorization: &str) -> Result<bool>;

    /// Creates a cinema.
    ///
    /// # Errors
    ///
    /// Propagates the cinema service's error.
    async fn create_cinema(&self, input: &CinemaInput, authorization: &str) -> Result<Cinema>;

    /// Updates a cinema.
    ///
    /// # Errors
    ///
    /// Propagates the cinema service's error.
    async fn update_cinema(
        &self,
        id: &str,
        input: &CinemaInput,
        authorization: &str,
    ) -> Result<Cinema>;

    /// Deletes a cinema.
    ///
    /// # Errors
    ///
    /// Propagates the cinema service's error.
    async fn delete_cinema(&self, id: &str, authorization: &str) -> Result<bool>;
}

const MOVIE_FIELDS: &str = "id title description genre duration releaseDate";
const CINEMA_FIELDS: &str = "id name location city";

#[derive(Deserialize)]
struct MoviesData {
    movies: Vec<Movie>,
}

#[derive(Deserialize)]
struct CinemasData {
    cinemas: Vec<Cinema>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMovieData {
    create_movie: Movie,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMovieData {
    update_movie: Movie,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteMovieData {
    delete_movie: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCinemaData {
    create_cinema: Cinema,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCinemaData {
    update_cinema: Cinema,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteCinemaData {
    delete_cinema: bool,
}

/// [`Catalog`] backed by the movie and cinema services.
pub struct RemoteCatalog {
    movies: RemoteService,
    cinemas: RemoteService,
}

impl RemoteCatalog {
    /// Catalog over the two services
    #[must_use]
    pub const fn new(movies: RemoteService, cinemas: RemoteService) -> Self {
        Self { movies, cinemas }
    }
}

#[async_trait]
impl Catalog for RemoteCatalog {
    async fn movies(&self, authorization: Option<&str>) -> Result<Vec<Movie>> {
        let query = format!("query Movies {{ movies {{ {MOVIE_FIELDS} }} }}");
        let data: MoviesData = self.movies.query(&query, json!({}), authorization).await?;
        Ok(data.movies)
    }

    async fn cinemas(&self, authorization: Option<&str>) -> Result<Vec<Cinema>> {
        let query = format!("query Cinemas {{ cinemas {{ {CINEMA_FIELDS} }} }}");
        let data: CinemasData = self.cinemas.query(&query, json!({}), authorization).await?;
        Ok(data.cinemas)
    }

    async fn create_movie(&self, input: &MovieInput, authorization: &str) -> Result<Movie> {
        let query = format!(
            "mutation CreateMovie($input: MovieInput!) {{ createMovie(input: $input) {{ {MOVIE_FIELDS} }} }}"
        );
        let data: CreateMovieData = self
            .movies
            .query(&query, json!({ "input": input }), Some(authorization))
            .await?;
        Ok(data.create_movie)
    }

    async fn update_movie(&self, id: &str, input: &MovieInput, authorization: &str) -> Result<Movie> {
        let query = format!(
            "mutation UpdateMovie($id: ID!, $input: MovieInput!) {{ updateMovie(id: $id, input: $input) {{ {MOVIE_FIELDS} }} }}"
        );
        let data: UpdateMovieData = self
            .movies
            .query(&query, json!({ "id": id, "input": input }), Some(authorization))
            .await?;
        Ok(data.update_movie)
    }

    async fn delete_movie(&self, id: &str, authorization: &str) -> Result<bool> {
        let data: DeleteMovieData = self
            .movies
            .query(
                "mutation DeleteMovie($id: ID!) { deleteMovie(id: $id) }",
                json!({ "id": id }),
                Some(authorization),
            )
            .await?;
        Ok(data.delete_movie)
    }

    async fn create_cinema(&self, input: &CinemaInput, authorization: &str) -> Result<Cinema> {
        let query = format!(
            "mutation CreateCinema($input: CinemaInput!) {{ createCinema(input: $input) {{ {CINEMA_FIELDS} }} }}"
        );
        let data: CreateCinemaData = self
            .cinemas
            .query(&query, json!({ "input": input }), Some(authorization))
            .await?;
        Ok(data.create_cinema)
    }

    async fn update_cinema(
        &self,
        id: &str,
        input: &CinemaInput,
        authorization: &str,
    ) -> Result<Cinema> {
        let query = format!(
            "mutation UpdateCinema($id: ID!, $input: CinemaInput!) {{ updateCinema(id: $id, input: $input) {{ {CINEMA_FIELDS} }} }}"
        );
        let data: UpdateCinemaData = self
            .cinemas
            .query(&query, json!({ "id": id, "input": input }), Some(authorization))
            .await?;
        Ok(data.update_cinema)
    }

    async fn delete_cinema(&self, id: &str, authorization: &str) -> Result<bool> {
        let data: DeleteCinemaData = self
            .cinemas
            .query(
                "mutation DeleteCinema($id: ID!) { deleteCinema(id: $id) }",
                json!({ "id": id }),
                Some(authorization),
            )
            .await?;
        Ok(data.delete_cinema)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn auth_payload_requires_token_and_user() {
        let payload: RemoteAuthPayload = serde_json::from_str(
            r#"{"success": true, "token": "t", "user": {"id": 5, "username": "ana", "email": "a@x", "role": "admin"}}"#,
        )
        .unwrap();
        let session = payload.into_session().unwrap();
        assert_eq!(session.user.user_id, UserId::new(5));
        assert_eq!(session.user.role, Role::Admin);

        let failed: RemoteAuthPayload =
            serde_json::from_str(r#"{"success": false, "error": "email already registered"}"#).unwrap();
        assert_eq!(
            failed.into_session().unwrap_err(),
            Error::BadInput("email already registered".into())
        );
    }

    #[test]
    fn catalog_rows_accept_numeric_ids() {
        let movie: Movie =
            serde_json::from_str(r#"{"id": 12, "title": "Heat", "releaseDate": "1995-12-15"}"#).unwrap();
        assert_eq!(movie.id, "12");
        assert_eq!(movie.release_date.as_deref(), Some("1995-12-15"));
        assert_eq!(movie.genre, None);
    }
}
