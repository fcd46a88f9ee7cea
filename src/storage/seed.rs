// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup provisioning: the configured administrator and the demo catalog.

use chrono::{NaiveDate, Utc};

use super::database::{Store, StoreError};
use super::repository::{AdminRepository, NewAdmin, NewShow, ShowRepository};
use crate::crypto::PasswordHash;
use crate::models::{AccessGroup, Money, Rating};

/// (name, release date, rating, director, minutes, genre, premium price in cents)
///
/// A `None` price marks a Basic show.
type CatalogEntry = (&'static str, &'static str, Rating, &'static str, u32, &'static str, Option<i64>);

const CATALOG: &[CatalogEntry] = &[
    ("The Matrix", "1999-03-31", Rating::M, "Lana Wachowski", 136, "Sci-Fi", Some(699)),
    ("Inception", "2010-07-16", Rating::M, "Christopher Nolan", 148, "Sci-Fi", Some(799)),
    ("The Dark Knight", "2008-07-18", Rating::M, "Christopher Nolan", 152, "Action", Some(799)),
    ("Pulp Fiction", "1994-10-14", Rating::Ma15, "Quentin Tarantino", 154, "Crime", Some(699)),
    ("The Godfather", "1972-03-24", Rating::Ma15, "Francis Ford Coppola", 175, "Crime", Some(899)),
    ("The Shawshank Redemption", "1994-09-23", Rating::Ma15, "Frank Darabont", 142, "Drama", Some(899)),
    ("Interstellar", "2014-11-07", Rating::M, "Christopher Nolan", 169, "Sci-Fi", Some(899)),
    ("Mad Max: Fury Road", "2015-05-15", Rating::Ma15, "George Miller", 120, "Action", Some(699)),
    ("Parasite", "2019-05-30", Rating::Ma15, "Bong Joon-ho", 132, "Thriller", Some(799)),
    ("Breaking Bad", "2008-01-20", Rating::Ma15, "Vince Gilligan", 47, "Crime", Some(899)),
    ("Game of Thrones", "2011-04-17", Rating::Ma15, "David Benioff", 57, "Fantasy", Some(999)),
    ("The Crown", "2016-11-04", Rating::M, "Peter Morgan", 58, "Biography", Some(799)),
    ("Forrest Gump", "1994-07-06", Rating::M, "Robert Zemeckis", 142, "Drama", None),
    ("The Lion King", "1994-06-24", Rating::G, "Roger Allers", 88, "Animation", None),
    ("Toy Story", "1995-11-22", Rating::G, "John Lasseter", 81, "Animation", None),
    ("Shrek", "2001-05-18", Rating::Pg, "Andrew Adamson", 90, "Animation", None),
    ("Up", "2009-05-29", Rating::Pg, "Pete Docter", 96, "Animation", None),
    ("The Avengers", "2012-05-04", Rating::M, "Joss Whedon", 143, "Action", None),
    ("Iron Man", "2008-05-02", Rating::M, "Jon Favreau", 126, "Action", None),
    ("Friends", "1994-09-22", Rating::Pg, "David Crane", 22, "Comedy", None),
    ("The Office", "2005-03-24", Rating::Pg, "Greg Daniels", 22, "Comedy", None),
    ("Brooklyn Nine-Nine", "2013-09-17", Rating::M, "Dan Goor", 22, "Comedy", None),
    ("The Simpsons", "1989-12-17", Rating::Pg, "Matt Groening", 22, "Animation", None),
];

/// Insert the demo catalog if the show table is empty.
///
/// Returns the number of shows inserted.
pub fn seed_catalog(store: &Store) -> Result<usize, StoreError> {
    store.write(|scope| {
        let repo = ShowRepository::new(scope);
        if !repo.is_empty()? {
            return Ok(0);
        }

        for &(name, released, rating, director, minutes, genre, price) in CATALOG {
            let release_date = NaiveDate::parse_from_str(released, "%Y-%m-%d")
                .map_err(|e| StoreError::Invalid(format!("catalog date {released}: {e}")))?;
            repo.create(NewShow {
                name: name.to_string(),
                release_date,
                rating,
                director: director.to_string(),
                length_minutes: minutes,
                genre: genre.to_string(),
                access_group: if price.is_some() {
                    AccessGroup::Premium
                } else {
                    AccessGroup::Basic
                },
                cost_to_buy: price.map(Money::from_cents),
            })?;
        }
        Ok(CATALOG.len())
    })
}

/// Create the administrator account unless the username already exists.
///
/// Returns `true` when a new admin row was written.
pub fn ensure_admin(store: &Store, username: &str, password: PasswordHash) -> Result<bool, StoreError> {
    store.write(|scope| {
        let repo = AdminRepository::new(scope);
        if repo.find_by_username(username)?.is_some() {
            return Ok(false);
        }
        repo.create(NewAdmin {
            username: username.to_string(),
            password,
            role: "admin".to_string(),
            created_at: Utc::now(),
        })?;
        Ok(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_password;

    #[test]
    fn catalog_seeds_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();

        assert_eq!(seed_catalog(&store).unwrap(), CATALOG.len());
        assert_eq!(seed_catalog(&store).unwrap(), 0);

        let shows = store.read(|scope| ShowRepository::new(scope).list()).unwrap();
        assert_eq!(shows.len(), CATALOG.len());
        for show in shows {
            match show.access_group {
                AccessGroup::Basic => assert!(show.cost_to_buy.is_none()),
                AccessGroup::Premium => assert!(show.cost_to_buy.is_some()),
            }
        }
    }

    #[test]
    fn admin_bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();

        assert!(ensure_admin(&store, "admin", hash_password("bootstrap-pass").unwrap()).unwrap());
        assert!(!ensure_admin(&store, "Admin", hash_password("other-pass").unwrap()).unwrap());
    }
}
