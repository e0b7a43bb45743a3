//! Who a reminder goes to and how it addresses them.

use super::collaborators::{BookingContext, CrewMember};

pub const FALLBACK_FIRST_NAME: &str = "there";
pub const FALLBACK_CREATIVE_PARTNER: &str = "your creative partner";

const ASSIGNED_STATUSES: &[&str] = &["selected", "assigned", "confirmed"];

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Account email, then the booking's guest email, then the lead's.
pub fn recipient_email(context: &BookingContext) -> Option<String> {
    non_empty(context.user.as_ref().and_then(|user| user.email.as_deref()))
        .or_else(|| non_empty(context.booking.guest_email.as_deref()))
        .or_else(|| non_empty(context.lead.as_ref().and_then(|lead| lead.guest_email.as_deref())))
        .map(str::to_string)
}

pub fn first_name(context: &BookingContext, email: Option<&str>) -> String {
    if let Some(token) = context
        .user
        .as_ref()
        .and_then(|user| non_empty(user.full_name.as_deref()))
        .and_then(|name| name.split_whitespace().next())
    {
        return token.to_string();
    }
    if let Some(name) = context
        .lead
        .as_ref()
        .and_then(|lead| non_empty(lead.client_name.as_deref()))
        .and_then(|name| name.split_whitespace().next())
    {
        return name.to_string();
    }
    email
        .and_then(name_from_email)
        .unwrap_or_else(|| FALLBACK_FIRST_NAME.to_string())
}

/// `"a.b-c@x.com"` becomes `"A"`: punctuation in the local part splits words.
pub fn name_from_email(email: &str) -> Option<String> {
    let local = email.split('@').next()?;
    let normalized: String = local
        .chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
        .collect();
    let token = normalized.split_whitespace().next()?;
    let mut chars = token.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

/// Accepted assignment, then an assigned-looking status, then the most
/// recently updated one.
pub fn creative_partner(crew: &[CrewMember]) -> String {
    let chosen = crew
        .iter()
        .find(|member| member.assignment.is_accepted)
        .or_else(|| {
            crew.iter().find(|member| {
                let status = member.assignment.status.trim();
                ASSIGNED_STATUSES
                    .iter()
                    .any(|candidate| status.eq_ignore_ascii_case(candidate))
            })
        })
        .or_else(|| crew.iter().max_by_key(|member| member.assignment.updated_at));

    chosen
        .and_then(|member| non_empty(member.display_name.as_deref()))
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_CREATIVE_PARTNER.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use uuid::Uuid;

    use super::*;
    use crate::models::{Booking, CrewAssignment, Lead, User};
    use crate::types::{BookingStatus, PaymentStatus};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn context() -> BookingContext {
        BookingContext {
            booking: Booking {
                id: Uuid::new_v4(),
                lead_id: None,
                user_id: None,
                guest_email: None,
                event_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
                start_time: None,
                location: None,
                status: BookingStatus::Confirmed,
                is_active: true,
                is_draft: false,
                payment_status: PaymentStatus::Paid,
                created_at: at(0),
                updated_at: at(0),
            },
            user: None,
            lead: None,
            crew: Vec::new(),
        }
    }

    fn user(email: Option<&str>, name: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.map(str::to_string),
            full_name: name.map(str::to_string),
            role: "client".into(),
            created_at: at(0),
            updated_at: at(0),
        }
    }

    fn lead(email: Option<&str>, name: Option<&str>) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            client_name: name.map(str::to_string),
            guest_email: email.map(str::to_string),
            created_at: at(0),
            updated_at: at(0),
        }
    }

    fn member(status: &str, accepted: bool, updated: u32, name: &str) -> CrewMember {
        CrewMember {
            assignment: CrewAssignment {
                id: Uuid::new_v4(),
                booking_id: Uuid::nil(),
                crew_member_id: Uuid::new_v4(),
                status: status.into(),
                is_accepted: accepted,
                is_active: true,
                created_at: at(0),
                updated_at: at(updated),
            },
            display_name: Some(name.into()),
        }
    }

    #[test]
    fn email_prefers_account_then_booking_then_lead() {
        let mut ctx = context();
        ctx.lead = Some(lead(Some("lead@x.com"), None));
        assert_eq!(recipient_email(&ctx).as_deref(), Some("lead@x.com"));

        ctx.booking.guest_email = Some("guest@x.com".into());
        assert_eq!(recipient_email(&ctx).as_deref(), Some("guest@x.com"));

        ctx.user = Some(user(Some("account@x.com"), None));
        assert_eq!(recipient_email(&ctx).as_deref(), Some("account@x.com"));
    }

    #[test]
    fn blank_emails_are_skipped() {
        let mut ctx = context();
        ctx.user = Some(user(Some("  "), None));
        ctx.booking.guest_email = Some(String::new());
        assert_eq!(recipient_email(&ctx), None);
    }

    #[test]
    fn lead_guest_email_yields_capitalized_local_part_name() {
        let mut ctx = context();
        ctx.lead = Some(lead(Some("a.b-c@x.com"), None));
        let email = recipient_email(&ctx);
        assert_eq!(email.as_deref(), Some("a.b-c@x.com"));
        assert_eq!(first_name(&ctx, email.as_deref()), "A");
    }

    #[test]
    fn first_name_prefers_account_name_then_lead_client_name() {
        let mut ctx = context();
        ctx.lead = Some(lead(None, Some("Morgan Lee")));
        assert_eq!(first_name(&ctx, Some("x@y.com")), "Morgan");

        ctx.user = Some(user(None, Some("Jamie Rivera")));
        assert_eq!(first_name(&ctx, Some("x@y.com")), "Jamie");
    }

    #[test]
    fn first_name_falls_back_to_there() {
        assert_eq!(first_name(&context(), None), FALLBACK_FIRST_NAME);
        assert_eq!(first_name(&context(), Some("...@x.com")), FALLBACK_FIRST_NAME);
    }

    #[test]
    fn accepted_partner_wins() {
        let crew = vec![
            member("confirmed", false, 5, "Confirmed"),
            member("pending", true, 1, "Accepted"),
        ];
        assert_eq!(creative_partner(&crew), "Accepted");
    }

    #[test]
    fn assigned_status_is_case_insensitive() {
        let crew = vec![
            member("invited", false, 9, "Invited"),
            member("ASSIGNED", false, 1, "Assigned"),
        ];
        assert_eq!(creative_partner(&crew), "Assigned");
    }

    #[test]
    fn most_recent_assignment_is_last_resort() {
        let crew = vec![
            member("invited", false, 2, "Older"),
            member("invited", false, 7, "Newer"),
        ];
        assert_eq!(creative_partner(&crew), "Newer");
        assert_eq!(creative_partner(&[]), FALLBACK_CREATIVE_PARTNER);
    }
}
