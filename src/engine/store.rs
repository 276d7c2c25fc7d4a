use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;
use crate::store::{ReservationStore, StoreError};

use super::Engine;

#[async_trait]
impl ReservationStore for Engine {
    async fn list_reservations(
        &self,
        venue_id: Ulid,
        date: &DayKey,
    ) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.reservations_for_day(venue_id, date).await)
    }

    async fn insert_reservation(
        &self,
        draft: ReservationDraft,
        owner: OwnerId,
    ) -> Result<Reservation, StoreError> {
        self.commit_reservation(draft, owner).await
    }

    async fn get_reservation(&self, id: Ulid) -> Result<Reservation, StoreError> {
        self.find_reservation(id).await
    }

    async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, StoreError> {
        Engine::cancel_reservation(self, id).await
    }

    async fn reschedule_reservation(
        &self,
        id: Ulid,
        date: DayKey,
        slot: Slot,
    ) -> Result<Reservation, StoreError> {
        Engine::reschedule_reservation(self, id, date, slot).await
    }
}
