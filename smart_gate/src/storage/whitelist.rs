use log::{info, warn};
use rusqlite::{params, OptionalExtension};

use super::{is_unique_violation, Database, WhitelistEntry, WhitelistInsert};
use crate::error::StoreError;
use crate::plate_number::PlateNumber;

impl Database {
    /// Adds a plate to the whitelist. A plate that is already present is
    /// reported back as such rather than failing.
    pub fn insert_whitelist(&self, plate: &PlateNumber) -> Result<WhitelistInsert, StoreError> {
        match self.conn.execute(
            "INSERT INTO whitelist (plate_number) VALUES (?1)",
            params![plate.as_str()],
        ) {
            Ok(_) => {
                info!("Plate {plate} added to whitelist");
                Ok(WhitelistInsert::Added(self.conn.last_insert_rowid()))
            }
            Err(err) if is_unique_violation(&err) => {
                warn!("Plate {plate} is already whitelisted");
                Ok(WhitelistInsert::AlreadyPresent)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn is_whitelisted(&self, plate: &PlateNumber) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM whitelist WHERE plate_number = ?1",
                params![plate.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_whitelist(&self) -> Result<Vec<WhitelistEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, plate_number FROM whitelist ORDER BY id ASC")?;
        let entries = stmt
            .query_map([], |row| {
                Ok(WhitelistEntry {
                    id: row.get(0)?,
                    plate_number: PlateNumber::from_stored(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Renames an entry. Unlike [`Database::insert_whitelist`], renaming onto a
    /// plate that another row already holds is an error.
    pub fn update_whitelist(&self, id: i64, plate: &PlateNumber) -> Result<(), StoreError> {
        let changed = match self.conn.execute(
            "UPDATE whitelist SET plate_number = ?1 WHERE id = ?2",
            params![plate.as_str(), id],
        ) {
            Ok(changed) => changed,
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::DuplicatePlate(plate.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        if changed == 0 {
            return Err(StoreError::MissingRow {
                table: "whitelist",
                id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate_number::PlateValidator;

    fn plate(raw: &str) -> PlateNumber {
        PlateValidator::default().parse(raw).unwrap()
    }

    #[test]
    fn test_insert_whitelist_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let p = plate("444BOP02");

        assert!(matches!(
            db.insert_whitelist(&p).unwrap(),
            WhitelistInsert::Added(_)
        ));
        assert_eq!(
            db.insert_whitelist(&p).unwrap(),
            WhitelistInsert::AlreadyPresent
        );

        let entries = db.list_whitelist().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].plate_number, p);
    }

    #[test]
    fn test_is_whitelisted() {
        let db = Database::in_memory().unwrap();
        db.insert_whitelist(&plate("444BOP02")).unwrap();

        assert!(db.is_whitelisted(&plate("444BOP02")).unwrap());
        assert!(!db.is_whitelisted(&plate("777XYZ11")).unwrap());
    }

    #[test]
    fn test_update_whitelist() {
        let db = Database::in_memory().unwrap();
        let WhitelistInsert::Added(id) = db.insert_whitelist(&plate("444BOP02")).unwrap() else {
            panic!("expected a new entry");
        };
        db.insert_whitelist(&plate("019KAZ02")).unwrap();

        db.update_whitelist(id, &plate("444BOP03")).unwrap();
        assert!(db.is_whitelisted(&plate("444BOP03")).unwrap());
        assert!(!db.is_whitelisted(&plate("444BOP02")).unwrap());

        assert!(matches!(
            db.update_whitelist(id, &plate("019KAZ02")),
            Err(StoreError::DuplicatePlate(_))
        ));
        assert!(matches!(
            db.update_whitelist(999, &plate("111AAA11")),
            Err(StoreError::MissingRow { .. })
        ));
    }
}
