// Allow dead_code because each test file is compiled as a separate crate,
// so not all helper functions are used in every test file.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use rsperm_domain::model::{ModelDescriptor, RelationField};
use rsperm_domain::{
    Action, ModelType, Object, ObjectId, PermissionRegistry, QueryExecutor, RegistryConfig,
    Schema, User, UserId, Value,
};
use rsperm_server::handlers::{EndpointResult, ModelViewSet, ViewResponse};
use rsperm_storage::{Fields, MemoryAclBackend, MemoryDatabase, RecordStore};

pub type Registry = PermissionRegistry<MemoryAclBackend, MemoryDatabase>;
pub type ViewSet = ModelViewSet<MemoryAclBackend, MemoryDatabase, MemoryDatabase>;

/// Actions every matrix is run for.
pub const ACTIONS: [Action; 2] = [Action::View, Action::Change];

pub fn model(name: &str) -> ModelType {
    ModelType::new(name).unwrap()
}

// ============================================================================
// Schema
// ============================================================================

/// The test application.
///
/// - `ItemA.parent`: foreign key to Container
/// - `ItemB.parents`: many-to-many to Container
/// - `ItemC.container`: reverse side of `Container.item_c`
/// - `ItemD.containers`: many-to-many to Container, declared from ItemD
/// - `ItemE`: foreign key to Container plus its own owner
pub fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::new()
            .with_model(
                ModelDescriptor::new(model("Container"))
                    .field("name")
                    .field("owner")
                    .relation(RelationField::foreign_key("item_c", model("ItemC"))),
            )
            .with_model(
                ModelDescriptor::new(model("ItemA"))
                    .field("name")
                    .relation(RelationField::foreign_key("parent", model("Container"))),
            )
            .with_model(ModelDescriptor::new(model("ItemB")).field("name").relation(
                RelationField::many_to_many(
                    "parents",
                    model("Container"),
                    model("ItemBParents"),
                    "itemb_id",
                    "container_id",
                ),
            ))
            .with_model(
                ModelDescriptor::new(model("ItemBParents"))
                    .field("itemb_id")
                    .field("container_id"),
            )
            .with_model(ModelDescriptor::new(model("ItemC")).field("name").relation(
                RelationField::reverse("container", model("Container"), "item_c_id"),
            ))
            .with_model(ModelDescriptor::new(model("ItemD")).field("name").relation(
                RelationField::many_to_many(
                    "containers",
                    model("Container"),
                    model("ContainerItemsD"),
                    "itemd_id",
                    "container_id",
                ),
            ))
            .with_model(
                ModelDescriptor::new(model("ContainerItemsD"))
                    .field("container_id")
                    .field("itemd_id"),
            )
            .with_model(
                ModelDescriptor::new(model("ItemE"))
                    .field("name")
                    .field("owner")
                    .relation(RelationField::foreign_key("parent", model("Container"))),
            ),
    )
}

// ============================================================================
// World
// ============================================================================

/// Shared storage and ACL backend. Registries built from one world see the
/// same rows and grants.
pub struct World {
    pub schema: Arc<Schema>,
    pub db: Arc<MemoryDatabase>,
    pub acl: Arc<MemoryAclBackend>,
}

impl World {
    pub fn new() -> Self {
        let schema = schema();
        let acl = Arc::new(MemoryAclBackend::new());
        for name in ["Container", "ItemA", "ItemB", "ItemC", "ItemD", "ItemE"] {
            acl.register_model(&model(name));
        }
        Self {
            db: MemoryDatabase::new_shared(Arc::clone(&schema)),
            schema,
            acl,
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry_with(RegistryConfig::default())
    }

    pub fn registry_with(&self, config: RegistryConfig) -> Arc<Registry> {
        Arc::new(PermissionRegistry::with_config(
            Arc::clone(&self.schema),
            Arc::clone(&self.acl),
            Arc::clone(&self.db),
            config,
        ))
    }

    pub fn view_set(&self, registry: &Arc<Registry>, name: &str) -> Result<ViewSet> {
        Ok(ModelViewSet::new(registry, &model(name), Arc::clone(&self.db))?)
    }

    pub async fn insert(&self, name: &str, fields: &[(&str, Value)]) -> Result<Object> {
        let fields: Fields = fields
            .iter()
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect();
        Ok(self.db.insert(&model(name), fields).await?)
    }

    pub async fn container(&self, name: &str) -> Result<Object> {
        self.insert("Container", &[("name", Value::from(name))]).await
    }

    pub async fn owned_container(&self, name: &str, owner: UserId) -> Result<Object> {
        self.insert(
            "Container",
            &[("name", Value::from(name)), ("owner", Value::Int(owner.0))],
        )
        .await
    }

    pub async fn link(&self, item: &Object, relation: &str, container: &Object) -> Result<()> {
        self.db.link(item, relation, container.id).await?;
        Ok(())
    }

    /// Ids returned by executing the collection query.
    pub async fn granted_ids(
        &self,
        registry: &Registry,
        name: &str,
        user: &User,
        action: &Action,
    ) -> Result<BTreeSet<ObjectId>> {
        let query = registry.collection_query(&model(name), user, action).await?;
        Ok(self.db.execute_ids(&query).await?.into_iter().collect())
    }

    /// Ids of the rows `decide` grants, checked one by one.
    pub async fn decided_ids(
        &self,
        registry: &Registry,
        name: &str,
        user: &User,
        action: &Action,
    ) -> Result<BTreeSet<ObjectId>> {
        let mut ids = BTreeSet::new();
        for row in self.db.list(&model(name)).await? {
            if registry.decide(user, action, &row).await? {
                ids.insert(row.id);
            }
        }
        Ok(ids)
    }

    /// Applies the native grants of one matrix row to `grants.user_id()`.
    pub fn grant(&self, grants: Grants, scenario: &Scenario) -> Result<()> {
        let user = grants.user_id();
        let container = model("Container");
        let item = &scenario.item_permission_model;

        for (granted, action) in [(grants.read, Action::View), (grants.write, Action::Change)] {
            if granted {
                self.acl
                    .grant_role(user, &container, &action.codename(&container))?;
            }
        }
        for (granted, action) in [
            (grants.item_read, Action::View),
            (grants.item_write, Action::Change),
        ] {
            if granted {
                self.acl.grant_role(user, item, &action.codename(item))?;
            }
        }
        for (granted, action) in [
            (grants.row_read, Action::View),
            (grants.row_write, Action::Change),
        ] {
            if granted {
                for row in &scenario.containers {
                    if scenario.granted_containers.contains(&row.id) {
                        self.acl
                            .grant_row(user, &action.codename(&container), row)?;
                    }
                }
            }
        }
        for (granted, action) in [
            (grants.item_row_read, Action::View),
            (grants.item_row_write, Action::Change),
        ] {
            if granted {
                for row in &scenario.items {
                    if scenario.directly_granted_items.contains(&row.id) {
                        self.acl.grant_row(user, &action.codename(item), row)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps an endpoint outcome to its HTTP status code.
pub fn status(result: EndpointResult<ViewResponse>) -> u16 {
    match result {
        Ok(_) => 200,
        Err(err) => err.status_code(),
    }
}

// ============================================================================
// Grant matrix
// ============================================================================

/// One row of the grant matrix.
///
/// `read`/`write` are model-wide view/change permissions on Container,
/// `row_*` are per-row grants on the scenario's row-granted containers,
/// `item_*` are model-wide grants on the item model and `item_row_*`
/// per-row grants on the items marked for direct grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Grants {
    pub read: bool,
    pub write: bool,
    pub row_read: bool,
    pub row_write: bool,
    pub item_read: bool,
    pub item_write: bool,
    pub item_row_read: bool,
    pub item_row_write: bool,
}

impl Grants {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            read: bits & 1 != 0,
            write: bits & 2 != 0,
            row_read: bits & 4 != 0,
            row_write: bits & 8 != 0,
            item_read: bits & 16 != 0,
            item_write: bits & 32 != 0,
            item_row_read: bits & 64 != 0,
            item_row_write: bits & 128 != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        [
            self.read,
            self.write,
            self.row_read,
            self.row_write,
            self.item_read,
            self.item_write,
            self.item_row_read,
            self.item_row_write,
        ]
        .iter()
        .enumerate()
        .filter(|(_, granted)| **granted)
        .map(|(bit, _)| 1u8 << bit)
        .sum()
    }

    pub fn all() -> Self {
        Self::from_bits(u8::MAX)
    }

    /// Every combination of the eight flags.
    pub fn matrix() -> impl Iterator<Item = Grants> {
        (0..=u8::MAX).map(Self::from_bits)
    }

    /// Every combination of the four container flags.
    pub fn container_matrix() -> impl Iterator<Item = Grants> {
        (0..16u8).map(Self::from_bits)
    }

    /// The user the grants are applied to; distinct per combination.
    pub fn user_id(&self) -> UserId {
        UserId(1000 + i64::from(self.bits()))
    }

    pub fn user(&self) -> User {
        User::authenticated(self.user_id())
    }

    pub fn role(&self, action: &Action) -> bool {
        pick(action, self.read, self.write)
    }

    pub fn row(&self, action: &Action) -> bool {
        pick(action, self.row_read, self.row_write)
    }

    pub fn item_role(&self, action: &Action) -> bool {
        pick(action, self.item_read, self.item_write)
    }

    pub fn item_row(&self, action: &Action) -> bool {
        pick(action, self.item_row_read, self.item_row_write)
    }
}

fn pick(action: &Action, view: bool, change: bool) -> bool {
    match action {
        Action::View => view,
        Action::Change => change,
        _ => false,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

/// Rows of one scenario and which of them receive per-row grants.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub item_model: ModelType,
    /// Model whose codenames the `item_*` flags grant.
    pub item_permission_model: ModelType,
    pub containers: Vec<Object>,
    pub granted_containers: BTreeSet<ObjectId>,
    pub items: Vec<Object>,
    pub directly_granted_items: BTreeSet<ObjectId>,
    /// Containers each item delegates to.
    pub parents: BTreeMap<ObjectId, BTreeSet<ObjectId>>,
}

impl Scenario {
    fn new(item_model: &str) -> Self {
        Self {
            item_model: model(item_model),
            item_permission_model: model(item_model),
            containers: Vec::new(),
            granted_containers: BTreeSet::new(),
            items: Vec::new(),
            directly_granted_items: BTreeSet::new(),
            parents: BTreeMap::new(),
        }
    }

    pub fn item_ids(&self) -> BTreeSet<ObjectId> {
        self.items.iter().map(|item| item.id).collect()
    }

    pub fn container(&self, id: ObjectId) -> Option<&Object> {
        self.containers.iter().find(|row| row.id == id)
    }

    /// Native grant on a container.
    pub fn native_on_container(&self, grants: Grants, action: &Action, id: ObjectId) -> bool {
        grants.role(action) || (grants.row(action) && self.granted_containers.contains(&id))
    }

    /// Native grant on the item itself.
    pub fn native_on_item(&self, grants: Grants, action: &Action, id: ObjectId) -> bool {
        if self.item_permission_model != self.item_model {
            return false;
        }
        grants.item_role(action)
            || (grants.item_row(action) && self.directly_granted_items.contains(&id))
    }

    pub fn parents_of(&self, id: ObjectId) -> impl Iterator<Item = ObjectId> + '_ {
        self.parents.get(&id).into_iter().flatten().copied()
    }

    /// Items granted by the native rule on the item or on any parent.
    pub fn delegated_ids(&self, grants: Grants, action: &Action) -> BTreeSet<ObjectId> {
        self.items
            .iter()
            .map(|item| item.id)
            .filter(|&id| {
                self.native_on_item(grants, action, id)
                    || self
                        .parents_of(id)
                        .any(|parent| self.native_on_container(grants, action, parent))
            })
            .collect()
    }

    fn add_item(&mut self, item: Object, parents: &[&Object], direct: bool) {
        if direct {
            self.directly_granted_items.insert(item.id);
        }
        self.parents
            .insert(item.id, parents.iter().map(|parent| parent.id).collect());
        self.items.push(item);
    }
}

/// Ten containers with two ItemA each; the first five receive per-row
/// grants. The containers themselves are the items under test.
pub async fn container_scenario(world: &World) -> Result<Scenario> {
    let mut scenario = Scenario::new("Container");
    for i in 0..10 {
        let container = world.container(&format!("container_{i}")).await?;
        for j in 0..2 {
            world
                .insert(
                    "ItemA",
                    &[
                        ("name", Value::from(format!("ItemA_{i}_{j}"))),
                        ("parent_id", Value::from(container.id)),
                    ],
                )
                .await?;
        }
        if i < 5 {
            scenario.granted_containers.insert(container.id);
        }
        scenario.containers.push(container.clone());
        scenario.add_item(container.clone(), &[&container], false);
    }
    Ok(scenario)
}

/// Two containers, the second a row-granted container, each with two items
/// of which the second receives direct grants.
async fn two_by_two(world: &World, item_model: &str, relation: Option<&str>) -> Result<Scenario> {
    let mut scenario = Scenario::new(item_model);
    let non_rights = match relation {
        Some(_) => Some(world.container("non_rights").await?),
        None => None,
    };
    if let Some(container) = &non_rights {
        scenario.containers.push(container.clone());
    }

    for row_granted in [false, true] {
        let container = world
            .container(&format!("container_{}", u8::from(row_granted)))
            .await?;
        if row_granted {
            scenario.granted_containers.insert(container.id);
        }
        for direct in [false, true] {
            let name = Value::from(format!(
                "{item_model}_{}_{}",
                u8::from(row_granted),
                u8::from(direct)
            ));
            let item = match relation {
                None => {
                    world
                        .insert(
                            item_model,
                            &[("name", name), ("parent_id", Value::from(container.id))],
                        )
                        .await?
                }
                Some(relation) => {
                    let item = world.insert(item_model, &[("name", name)]).await?;
                    world.link(&item, relation, &container).await?;
                    item
                }
            };
            match &non_rights {
                Some(other) => {
                    if let Some(relation) = relation {
                        world.link(&item, relation, other).await?;
                    }
                    scenario.add_item(item, &[&container, other], direct);
                }
                None => scenario.add_item(item, &[&container], direct),
            }
        }
        scenario.containers.push(container);
    }
    Ok(scenario)
}

/// ItemA rows hanging off containers through a foreign key.
pub async fn item_a_scenario(world: &World) -> Result<Scenario> {
    two_by_two(world, "ItemA", None).await
}

/// ItemB rows linked to their container and to a container without grants.
pub async fn item_b_scenario(world: &World) -> Result<Scenario> {
    two_by_two(world, "ItemB", Some("parents")).await
}

/// ItemD rows linked like ItemB, through a relation declared on ItemD.
pub async fn item_d_scenario(world: &World) -> Result<Scenario> {
    two_by_two(world, "ItemD", Some("containers")).await
}

/// Four ItemC rows, each pointed to by one container; a fifth container
/// points to nothing. The first two containers are row-granted containers and
/// items 0 and 2 receive direct grants.
pub async fn item_c_scenario(world: &World) -> Result<Scenario> {
    let mut scenario = Scenario::new("ItemC");
    scenario.containers.push(world.container("no_item_c").await?);

    for i in 0..4 {
        let item = world
            .insert("ItemC", &[("name", Value::from(format!("ItemC_{i}")))])
            .await?;
        let container = world
            .insert(
                "Container",
                &[
                    ("name", Value::from(format!("container_{i}"))),
                    ("item_c_id", Value::from(item.id)),
                ],
            )
            .await?;
        if i < 2 {
            scenario.granted_containers.insert(container.id);
        }
        scenario.add_item(item, &[&container], i % 2 == 0);
        scenario.containers.push(container);
    }
    Ok(scenario)
}

/// One row-granted container with three ItemE rows owned by the all-grants
/// user, by another matrix user and by a user outside the matrix.
pub async fn owner_scenario(world: &World) -> Result<Scenario> {
    let mut scenario = Scenario::new("ItemE");
    let container = world.container("blah").await?;
    scenario.granted_containers.insert(container.id);

    let owners = [
        Grants::all().user_id(),
        Grants::from_bits(0b0111_1111).user_id(),
        UserId(1),
    ];
    for (i, owner) in owners.into_iter().enumerate() {
        let item = world
            .insert(
                "ItemE",
                &[
                    ("name", Value::from("allowed")),
                    ("parent_id", Value::from(container.id)),
                    ("owner", Value::Int(owner.0)),
                ],
            )
            .await?;
        scenario.add_item(item, &[&container], i == 2);
    }
    scenario.containers.push(container);
    Ok(scenario)
}

/// Three containers: owned by the all-grants user, plain, and a row-granted
/// container; one ItemA under each. Item flags grant ItemE codenames, so
/// they never reach ItemA.
pub async fn delegated_owner_scenario(world: &World) -> Result<Scenario> {
    let mut scenario = Scenario::new("ItemA");
    scenario.item_permission_model = model("ItemE");

    let with_owner = world
        .owned_container("withowner", Grants::all().user_id())
        .await?;
    let plain = world.container("aa").await?;
    let with_native = world.container("withnative").await?;
    scenario.granted_containers.insert(with_native.id);

    for (name, container) in [
        ("allowed_via_owner", &with_owner),
        ("not_allowed", &plain),
        ("allowed_via_native", &with_native),
    ] {
        let item = world
            .insert(
                "ItemA",
                &[
                    ("name", Value::from(name)),
                    ("parent_id", Value::from(container.id)),
                ],
            )
            .await?;
        scenario.add_item(item, &[container], false);
    }
    scenario.containers = vec![with_owner, plain, with_native];
    Ok(scenario)
}

/// True when the container row is owned by `user`.
pub fn owned_by(container: &Object, user: UserId) -> bool {
    container.field("owner") == &Value::Int(user.0)
}

// ============================================================================
// Matrix runner
// ============================================================================

/// Runs every grant combination against `registry` and checks that the
/// collection query, per-object decisions and view set status codes all
/// agree with `expected`.
///
/// Detail status codes follow from the expected sets: rows outside the view
/// set are 404, rows viewable but not granted for the action are 403.
pub async fn run_matrix<F>(
    world: &World,
    scenario: &Scenario,
    registry: &Arc<Registry>,
    grants: impl IntoIterator<Item = Grants>,
    expected: F,
) -> Result<()>
where
    F: Fn(Grants, &Action) -> BTreeSet<ObjectId>,
{
    let name = scenario.item_model.as_str();
    let view_set = world.view_set(registry, name)?;

    for grants in grants {
        world.grant(grants, scenario)?;
        let user = grants.user();
        let viewable = expected(grants, &Action::View);

        for action in &ACTIONS {
            let expected_ids = expected(grants, action);
            assert_eq!(
                world.granted_ids(registry, name, &user, action).await?,
                expected_ids,
                "query: {name} {action} {grants:?}"
            );
            assert_eq!(
                world.decided_ids(registry, name, &user, action).await?,
                expected_ids,
                "decide: {name} {action} {grants:?}"
            );

            let operation = match action {
                Action::View => "retrieve",
                _ => "partial_update",
            };
            for item in &scenario.items {
                let expected_code = if !viewable.contains(&item.id) {
                    404
                } else if expected_ids.contains(&item.id) {
                    200
                } else {
                    403
                };
                let code = status(view_set.dispatch(operation, &user, Some(item.id)).await);
                assert_eq!(
                    code, expected_code,
                    "{operation} {}: parents {:?}, {grants:?}",
                    item, scenario.parents[&item.id]
                );
            }
        }

        let listed: BTreeSet<ObjectId> = view_set
            .list(&user)
            .await?
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(listed, viewable, "list: {name} {grants:?}");
    }
    Ok(())
}
