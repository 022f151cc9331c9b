//! Context → load timing rules.

use tourline_domain::bundle::{BundleConfig, BundlePriority, LoadStrategy};
use tourline_domain::context::{ActivityClass, ConnectionSpeed, DeviceType, LoadContext, UserRole};

/// When a bundle should be fetched for a given context.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::AsRefStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum LoadTiming {
    Immediate,
    Deferred,
    OnDemand,
}

/// A named predicate in the recommendation chain.
#[derive(Debug, Clone, Copy)]
pub struct RecommendationRule {
    pub name: &'static str,
    pub evaluate: fn(&BundleConfig, &LoadContext) -> Option<LoadTiming>,
}

/// Evaluated in order; the first rule returning a timing wins.
pub const RULES: [RecommendationRule; 5] = [
    RecommendationRule { name: "new-user", evaluate: new_user },
    RecommendationRule { name: "mobile-user", evaluate: mobile_user },
    RecommendationRule { name: "admin-user", evaluate: admin_user },
    RecommendationRule { name: "slow-connection", evaluate: slow_connection },
    RecommendationRule { name: "page-specific", evaluate: page_specific },
];

fn new_user(bundle: &BundleConfig, ctx: &LoadContext) -> Option<LoadTiming> {
    (ctx.activity == Some(ActivityClass::New) && bundle.priority == BundlePriority::High)
        .then_some(LoadTiming::Immediate)
}

fn mobile_user(bundle: &BundleConfig, ctx: &LoadContext) -> Option<LoadTiming> {
    (ctx.device == Some(DeviceType::Mobile) && bundle.priority == BundlePriority::Low)
        .then_some(LoadTiming::OnDemand)
}

fn admin_user(bundle: &BundleConfig, ctx: &LoadContext) -> Option<LoadTiming> {
    (ctx.role == Some(UserRole::Admin) && bundle.roles.targets(UserRole::Admin))
        .then_some(LoadTiming::Immediate)
}

fn slow_connection(bundle: &BundleConfig, ctx: &LoadContext) -> Option<LoadTiming> {
    (ctx.connection == Some(ConnectionSpeed::Slow) && bundle.priority != BundlePriority::High)
        .then_some(LoadTiming::OnDemand)
}

fn page_specific(bundle: &BundleConfig, ctx: &LoadContext) -> Option<LoadTiming> {
    ctx.current_page
        .as_deref()
        .is_some_and(|page| bundle.matches_page(page))
        .then_some(LoadTiming::Immediate)
}

/// Timing for `bundle` under `ctx`, with the name of the deciding rule.
///
/// Eager bundles are always immediate. When no rule matches, the bundle's own strategy
/// decides: lazy bundles are deferred, on-demand bundles stay on demand.
#[must_use]
pub fn recommend(bundle: &BundleConfig, ctx: &LoadContext) -> (LoadTiming, &'static str) {
    if bundle.strategy == LoadStrategy::Eager {
        return (LoadTiming::Immediate, "eager");
    }

    RULES
        .iter()
        .find_map(|rule| (rule.evaluate)(bundle, ctx).map(|timing| (timing, rule.name)))
        .unwrap_or(match bundle.strategy {
            LoadStrategy::OnDemand => (LoadTiming::OnDemand, "strategy"),
            LoadStrategy::Eager | LoadStrategy::Lazy => (LoadTiming::Deferred, "strategy"),
        })
}

/// Bundle ids partitioned by timing, each list ordered high → low priority, then by
/// registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleRecommendations {
    pub immediate: Vec<String>,
    pub deferred: Vec<String>,
    pub on_demand: Vec<String>,
}

impl BundleRecommendations {
    pub(crate) fn push(&mut self, timing: LoadTiming, id: String) {
        match timing {
            LoadTiming::Immediate => self.immediate.push(id),
            LoadTiming::Deferred => self.deferred.push(id),
            LoadTiming::OnDemand => self.on_demand.push(id),
        }
    }

    #[must_use]
    pub fn timing_of(&self, id: &str) -> Option<LoadTiming> {
        let has = |list: &[String]| list.iter().any(|entry| entry == id);
        if has(&self.immediate) {
            Some(LoadTiming::Immediate)
        } else if has(&self.deferred) {
            Some(LoadTiming::Deferred)
        } else if has(&self.on_demand) {
            Some(LoadTiming::OnDemand)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourline_domain::roles::RoleSet;

    fn bundle(priority: BundlePriority) -> BundleConfig {
        BundleConfig::new("b", ["t1"]).priority(priority)
    }

    #[test]
    fn eager_is_always_immediate() {
        let eager = bundle(BundlePriority::Low).strategy(LoadStrategy::Eager);
        let ctx = LoadContext::new().device(DeviceType::Mobile);
        assert_eq!(recommend(&eager, &ctx), (LoadTiming::Immediate, "eager"));
    }

    #[test]
    fn falls_back_to_strategy() {
        let ctx = LoadContext::new();
        assert_eq!(recommend(&bundle(BundlePriority::Medium), &ctx).0, LoadTiming::Deferred);
        let on_demand = bundle(BundlePriority::Medium).strategy(LoadStrategy::OnDemand);
        assert_eq!(recommend(&on_demand, &ctx).0, LoadTiming::OnDemand);
    }

    #[test]
    fn every_rule_fires() {
        let new_user = LoadContext::new().activity(ActivityClass::New);
        assert_eq!(recommend(&bundle(BundlePriority::High), &new_user), (LoadTiming::Immediate, "new-user"));

        let mobile = LoadContext::new().device(DeviceType::Mobile);
        assert_eq!(recommend(&bundle(BundlePriority::Low), &mobile), (LoadTiming::OnDemand, "mobile-user"));

        let admin = LoadContext::new().role(UserRole::Admin);
        let admin_bundle = bundle(BundlePriority::Medium).roles(RoleSet::ADMIN | RoleSet::MANAGER);
        assert_eq!(recommend(&admin_bundle, &admin), (LoadTiming::Immediate, "admin-user"));
        assert_eq!(recommend(&bundle(BundlePriority::Medium), &admin).1, "strategy");

        let slow = LoadContext::new().connection(ConnectionSpeed::Slow);
        assert_eq!(recommend(&bundle(BundlePriority::Medium), &slow), (LoadTiming::OnDemand, "slow-connection"));
        assert_eq!(recommend(&bundle(BundlePriority::High), &slow).1, "strategy");

        let page = LoadContext::new().page("/campaigns/42/edit");
        let page_bundle = bundle(BundlePriority::Low).pages(["/campaigns"]);
        assert_eq!(recommend(&page_bundle, &page), (LoadTiming::Immediate, "page-specific"));
    }

    #[test]
    fn first_matching_rule_wins() {
        // Mobile + slow: the mobile rule is earlier in the chain.
        let ctx = LoadContext::new().device(DeviceType::Mobile).connection(ConnectionSpeed::Slow);
        assert_eq!(recommend(&bundle(BundlePriority::Low), &ctx).1, "mobile-user");

        // Slow connection beats a matching page.
        let ctx = LoadContext::new().connection(ConnectionSpeed::Slow).page("/clients");
        let paged = bundle(BundlePriority::Medium).pages(["/clients"]);
        assert_eq!(recommend(&paged, &ctx), (LoadTiming::OnDemand, "slow-connection"));
    }
}
