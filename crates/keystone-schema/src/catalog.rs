//! Built-in node classes every deployment carries.

use keystone_core::AccessPolicy;

use crate::class::NodeClass;
use crate::spec::{RelationOpts, SpecBuilder};

/// Edge role linking an organization to its people.
pub const MEMBER_ROLE: &str = "member";

/// A tenant. Root of ownership.
pub struct Organization;

impl NodeClass for Organization {
    const TYPE_NAME: &'static str = "Organization";

    fn gql_spec(gql: &mut SpecBuilder) {
        gql.field().string("name").nullable().string("domain");
        gql.relation()
            .many_with::<Person>("members", RelationOpts::new().role(MEMBER_ROLE));
    }
}

/// A person. Readable by the person themselves even from another org.
pub struct Person;

impl NodeClass for Person {
    const TYPE_NAME: &'static str = "Person";

    fn gql_spec(gql: &mut SpecBuilder) {
        gql.field().string("name").nullable().string("email");
        gql.relation().one_with::<Organization>(
            "organization",
            RelationOpts::new().role(MEMBER_ROLE).incoming(),
        );
        gql.mutation().created_by::<Organization>(MEMBER_ROLE);
    }

    fn access() -> AccessPolicy {
        AccessPolicy::self_referential()
    }
}
