//! [`User`]-related [`Database`] implementations.

use common::operations::{By, Delete, Insert, Select, Update};
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{
        user::{self, NewUser},
        User,
    },
    infra::{
        database::{self, Postgres},
        Database,
    },
};

/// Columns of the `users` table, in the order [`from_row()`] expects them.
const COLUMNS: &str = "\
    id, username, email, full_name, phone, \
    is_store_employee, require_password_change";

/// Reads a [`User`] out of the provided `users` table [`Row`].
fn from_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        phone: row.get("phone"),
        is_store_employee: row.get("is_store_employee"),
        require_password_change: row.get("require_password_change"),
    }
}

impl Database<Select<By<Option<User>, user::Id>>> for Postgres {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();

        let sql = format!("SELECT {COLUMNS} FROM users WHERE id = $1::INT8");
        self.query_opt(&sql, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(|row| row.as_ref().map(from_row))
    }
}

impl Database<Select<By<Option<User>, user::Email>>> for Postgres {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, user::Email>>,
    ) -> Result<Self::Ok, Self::Err> {
        let email = by.into_inner();

        let sql = format!(
            "SELECT {COLUMNS} FROM users \
             WHERE email = $1::VARCHAR \
             LIMIT 1",
        );
        self.query_opt(&sql, &[&email])
            .await
            .map_err(tracerr::wrap!())
            .map(|row| row.as_ref().map(from_row))
    }
}

impl Database<Select<By<Option<User>, user::Username>>> for Postgres {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, user::Username>>,
    ) -> Result<Self::Ok, Self::Err> {
        let username = by.into_inner();

        let sql = format!(
            "SELECT {COLUMNS} FROM users \
             WHERE username = $1::VARCHAR \
             LIMIT 1",
        );
        self.query_opt(&sql, &[&username])
            .await
            .map_err(tracerr::wrap!())
            .map(|row| row.as_ref().map(from_row))
    }
}

impl Database<Insert<NewUser>> for Postgres {
    type Ok = User;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(new): Insert<NewUser>,
    ) -> Result<Self::Ok, Self::Err> {
        let NewUser {
            username,
            email,
            full_name,
            phone,
            is_store_employee,
            require_password_change,
        } = &new;

        const SQL: &str = "\
            INSERT INTO users (\
                username, email, full_name, phone, \
                is_store_employee, require_password_change\
            ) \
            VALUES (\
                $1::VARCHAR, $2::VARCHAR, $3::VARCHAR, $4::VARCHAR, \
                $5::BOOL, $6::BOOL\
            ) \
            RETURNING id";
        let row = self
            .query_one(
                SQL,
                &[
                    username,
                    email,
                    full_name,
                    phone,
                    is_store_employee,
                    require_password_change,
                ],
            )
            .await
            .map_err(tracerr::wrap!())?;

        Ok(new.with_id(row.get("id")))
    }
}

impl Database<Update<User>> for Postgres {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(user): Update<User>,
    ) -> Result<Self::Ok, Self::Err> {
        let User {
            id,
            username,
            email,
            full_name,
            phone,
            is_store_employee,
            require_password_change,
        } = &user;

        const SQL: &str = "\
            UPDATE users \
            SET username = $2::VARCHAR, \
                email = $3::VARCHAR, \
                full_name = $4::VARCHAR, \
                phone = $5::VARCHAR, \
                is_store_employee = $6::BOOL, \
                require_password_change = $7::BOOL \
            WHERE id = $1::INT8";
        let updated = self
            .exec(
                SQL,
                &[
                    id,
                    username,
                    email,
                    full_name,
                    phone,
                    is_store_employee,
                    require_password_change,
                ],
            )
            .await
            .map_err(tracerr::wrap!())?;

        Ok((updated > 0).then_some(user))
    }
}

impl Database<Delete<By<User, user::Id>>> for Postgres {
    type Ok = bool;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<User, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();

        const SQL: &str = "DELETE FROM users WHERE id = $1::INT8";
        self.exec(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(|deleted| deleted > 0)
    }
}
