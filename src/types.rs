//! Status vocabulary, roles and timestamps shared by every service
use chrono::{DateTime, Utc};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[n(0)]
    Seller,
    #[n(1)]
    #[default]
    Buyer,
    #[n(2)]
    Admin,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Submitted,
    #[n(2)]
    UnderAdminReview,
    #[n(3)]
    Rejected,
    #[n(4)]
    Approved,
    #[n(5)]
    Live,
}

impl ListingStatus {
    pub const ALL: [ListingStatus; 6] = [
        ListingStatus::Draft,
        ListingStatus::Submitted,
        ListingStatus::UnderAdminReview,
        ListingStatus::Rejected,
        ListingStatus::Approved,
        ListingStatus::Live,
    ];
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VerificationStatus {
    #[n(0)]
    #[default]
    NotRequested,
    #[n(1)]
    AwaitingItem,
    #[n(2)]
    InInspection,
    #[n(3)]
    Verified,
    #[n(4)]
    Failed,
}

impl VerificationStatus {
    pub const ALL: [VerificationStatus; 5] = [
        VerificationStatus::NotRequested,
        VerificationStatus::AwaitingItem,
        VerificationStatus::InInspection,
        VerificationStatus::Verified,
        VerificationStatus::Failed,
    ];

    /// Item is with, or on its way to, the inspector
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            VerificationStatus::AwaitingItem | VerificationStatus::InInspection
        )
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaleStatus {
    #[n(0)]
    Initiated,
    #[n(1)]
    PendingVerification,
    #[n(2)]
    Confirmed,
    #[n(3)]
    Dispatched,
    #[n(4)]
    Delivered,
    #[n(5)]
    Completed,
    #[n(6)]
    Cancelled,
}

impl SaleStatus {
    pub const ALL: [SaleStatus; 7] = [
        SaleStatus::Initiated,
        SaleStatus::PendingVerification,
        SaleStatus::Confirmed,
        SaleStatus::Dispatched,
        SaleStatus::Delivered,
        SaleStatus::Completed,
        SaleStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Completed | SaleStatus::Cancelled)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinancialStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    HeldInEscrow,
    #[n(2)]
    Settled,
    #[n(3)]
    PaidOut,
    #[n(4)]
    Refunded,
}

// Declaration order is the order a parcel moves through the courier network.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum CourierStatus {
    #[n(0)]
    NotRequired,
    #[n(1)]
    AwaitingPickup,
    #[n(2)]
    InTransit,
    #[n(3)]
    ReceivedAtHub,
    #[n(4)]
    DispatchedToBuyer,
    #[n(5)]
    Delivered,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShipmentDirection {
    #[n(0)]
    SellerToHub,
    #[n(1)]
    HubToBuyer,
}

impl ShipmentDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentDirection::SellerToHub => "SELLER_TO_HUB",
            ShipmentDirection::HubToBuyer => "HUB_TO_BUYER",
        }
    }
}

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
)]
pub enum SellerTier {
    #[n(0)]
    #[default]
    Standard,
    #[n(1)]
    VerifiedSeller,
    #[n(2)]
    GoldSeller,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::now();

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: TimeStamp = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn courier_statuses_follow_parcel_route() {
        assert!(CourierStatus::AwaitingPickup < CourierStatus::InTransit);
        assert!(CourierStatus::ReceivedAtHub < CourierStatus::DispatchedToBuyer);
        assert!(CourierStatus::DispatchedToBuyer < CourierStatus::Delivered);
    }

    #[test]
    fn only_inspection_states_are_pending() {
        let pending: Vec<_> = VerificationStatus::ALL
            .into_iter()
            .filter(VerificationStatus::is_pending)
            .collect();
        assert_eq!(
            pending,
            vec![VerificationStatus::AwaitingItem, VerificationStatus::InInspection]
        );
    }
}
