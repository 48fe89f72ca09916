//! Courier legs of a sale: seller to hub, then hub to buyer.
use sled::Transactional;
use tracing::info;

use crate::error::{Entity, MarketError, MarketResult};
use crate::identity::User;
use crate::sale::{Sale, visible_sale};
use crate::store::{Store, TxResult, reject, tx_get_ref, tx_put, tx_put_ref, tx_require};
use crate::types::{CourierStatus, ShipmentDirection, TimeStamp};
use crate::utils::{SHIPMENT_HRP, new_uuid_to_bech32, non_blank, pair_key};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct CourierShipment {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub sale_id: String,
    #[n(2)]
    pub direction: ShipmentDirection,
    #[n(3)]
    pub status: CourierStatus,
    #[n(4)]
    pub tracking_reference: Option<String>,
    #[n(5)]
    pub cost_cents: u64,
    #[n(6)]
    pub created_at: TimeStamp,
    #[n(7)]
    pub updated_at: TimeStamp,
}

fn require_admin(caller: &User) -> MarketResult<()> {
    if !caller.is_admin() {
        return Err(MarketError::Forbidden("only admins can manage shipments".into()));
    }
    Ok(())
}

fn leg_key(sale_id: &str, direction: ShipmentDirection) -> String {
    pair_key(sale_id, direction.as_str())
}

#[derive(Debug, Clone)]
pub struct CourierService {
    store: Store,
}

impl CourierService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn create_shipment(
        &self,
        caller: &User,
        sale_id: &str,
        direction: ShipmentDirection,
        tracking_reference: Option<&str>,
        cost_cents: u64,
    ) -> MarketResult<CourierShipment> {
        require_admin(caller)?;
        let shipment_id = new_uuid_to_bech32(SHIPMENT_HRP)?;
        let tracking_reference = non_blank(tracking_reference);
        let leg = leg_key(sale_id, direction);
        let store = &self.store;

        let shipment = (&store.sales, &store.shipments, &store.shipment_legs).transaction(
            |(sales, shipments, legs)| -> TxResult<CourierShipment> {
                let sale: Sale = tx_require(sales, Entity::Sale, sale_id)?;
                if sale.status.is_terminal() {
                    return reject(MarketError::InvalidState(format!(
                        "sale {sale_id} is {:?}, nothing left to ship",
                        sale.status
                    )));
                }
                if let Some(existing) = tx_get_ref(legs, &leg)? {
                    return reject(MarketError::Conflict(format!(
                        "sale {sale_id} already has a {} shipment {existing}",
                        direction.as_str()
                    )));
                }

                let now = TimeStamp::now();
                let shipment = CourierShipment {
                    id: shipment_id.clone(),
                    sale_id: sale.id,
                    direction,
                    status: CourierStatus::AwaitingPickup,
                    tracking_reference: tracking_reference.clone(),
                    cost_cents,
                    created_at: now,
                    updated_at: now,
                };
                tx_put(shipments, &shipment.id, &shipment)?;
                tx_put_ref(legs, &leg, &shipment.id)?;
                Ok(shipment)
            },
        )?;

        info!(
            shipment_id = %shipment.id,
            sale_id,
            direction = direction.as_str(),
            admin_id = %caller.id,
            "shipment created"
        );
        Ok(shipment)
    }

    /// Record courier progress. Status only moves forward; the same status
    /// may be repeated to change the tracking reference.
    pub fn update_shipment(
        &self,
        caller: &User,
        shipment_id: &str,
        status: CourierStatus,
        tracking_reference: Option<&str>,
    ) -> MarketResult<CourierShipment> {
        require_admin(caller)?;
        let tracking_reference = non_blank(tracking_reference);

        let (shipment, previous) =
            self.store
                .shipments
                .transaction(|shipments| -> TxResult<(CourierShipment, CourierStatus)> {
                    let mut shipment: CourierShipment =
                        tx_require(shipments, Entity::Shipment, shipment_id)?;
                    let previous = shipment.status;
                    if status < previous {
                        return reject(MarketError::InvalidState(format!(
                            "shipment {shipment_id} cannot move back \
                             from {previous:?} to {status:?}"
                        )));
                    }
                    shipment.status = status;
                    if tracking_reference.is_some() {
                        shipment.tracking_reference = tracking_reference.clone();
                    }
                    shipment.updated_at = TimeStamp::now();
                    tx_put(shipments, &shipment.id, &shipment)?;
                    Ok((shipment, previous))
                })?;

        info!(shipment_id, from = ?previous, to = ?shipment.status, "shipment updated");
        Ok(shipment)
    }

    /// Legs of a sale in courier order, visible to whoever can see the sale.
    pub fn shipments_for_sale(
        &self,
        caller: &User,
        sale_id: &str,
    ) -> MarketResult<Vec<CourierShipment>> {
        let sale: Sale = self.store.require(&self.store.sales, Entity::Sale, sale_id)?;
        visible_sale(sale, caller)?;

        let mut shipments = Vec::new();
        for direction in [ShipmentDirection::SellerToHub, ShipmentDirection::HubToBuyer] {
            let Some(id) = self
                .store
                .get_ref(&self.store.shipment_legs, &leg_key(sale_id, direction))?
            else {
                continue;
            };
            shipments.push(self.store.require(&self.store.shipments, Entity::Shipment, &id)?);
        }
        Ok(shipments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legs_of_one_sale_have_distinct_keys() {
        assert_ne!(
            leg_key("sale_1", ShipmentDirection::SellerToHub),
            leg_key("sale_1", ShipmentDirection::HubToBuyer)
        );
    }
}
