//! VPC, subnets and routing.

use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::LogicalId;
use edgestack_synth::intrinsic;
use edgestack_synth::logical_id::ConstructPath;
use edgestack_synth::resource::CfnResource;
use edgestack_synth::stack::Stack;
use serde_json::{Value, json};

use super::cidr::{Ipv4Cidr, MIN_VPC_PREFIX};

/// Default VPC address range.
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";

/// Default number of availability zones.
pub const DEFAULT_MAX_AZS: usize = 2;

/// Routing class of a subnet group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubnetType {
    /// Routed to an internet gateway; instances may receive public IPs.
    Public,
    /// No route outside the VPC.
    Isolated,
}

impl SubnetType {
    /// Name used for the group when none is given.
    #[must_use]
    pub const fn default_group_name(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Isolated => "Isolated",
        }
    }
}

/// One subnet group, replicated in every availability zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetConfiguration {
    /// Group name, used in construct paths.
    pub name: String,
    /// Routing class.
    pub subnet_type: SubnetType,
    /// Fixed prefix length, or `None` to split the remaining space evenly.
    pub cidr_mask: Option<u8>,
}

impl SubnetConfiguration {
    /// A public group named `Public`.
    #[must_use]
    pub fn public() -> Self {
        Self {
            name: SubnetType::Public.default_group_name().into(),
            subnet_type: SubnetType::Public,
            cidr_mask: None,
        }
    }

    /// An isolated group named `Isolated`.
    #[must_use]
    pub fn isolated() -> Self {
        Self {
            name: SubnetType::Isolated.default_group_name().into(),
            subnet_type: SubnetType::Isolated,
            cidr_mask: None,
        }
    }
}

/// Properties of a [`Vpc`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcProps {
    /// Address range of the VPC.
    pub cidr: String,
    /// Number of availability zones to spread each subnet group over.
    pub max_azs: usize,
    /// Subnet groups.
    pub subnet_configuration: Vec<SubnetConfiguration>,
}

impl Default for VpcProps {
    fn default() -> Self {
        Self {
            cidr: DEFAULT_VPC_CIDR.into(),
            max_azs: DEFAULT_MAX_AZS,
            subnet_configuration: vec![SubnetConfiguration::public(), SubnetConfiguration::isolated()],
        }
    }
}

/// A declared subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    id: LogicalId,
    route_table: LogicalId,
    subnet_type: SubnetType,
    group: String,
    az_index: usize,
    cidr: Ipv4Cidr,
}

impl Subnet {
    /// Logical id of the subnet resource.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// `Ref` to the subnet.
    #[must_use]
    pub fn subnet_id(&self) -> Value {
        intrinsic::reference(&self.id)
    }

    /// Logical id of the subnet's route table.
    #[must_use]
    pub const fn route_table(&self) -> &LogicalId {
        &self.route_table
    }

    /// Routing class.
    #[must_use]
    pub const fn subnet_type(&self) -> SubnetType {
        self.subnet_type
    }

    /// Group the subnet belongs to.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Index of the availability zone in the region's zone list.
    #[must_use]
    pub const fn az_index(&self) -> usize {
        self.az_index
    }

    /// Address range.
    #[must_use]
    pub const fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }
}

/// Which subnets of a VPC to place resources in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubnetSelection {
    /// Isolated subnets if the VPC has any, otherwise public ones.
    #[default]
    Default,
    /// All subnets of one type.
    Type(SubnetType),
}

/// A virtual private cloud with its subnets.
#[derive(Debug, Clone)]
pub struct Vpc {
    path: ConstructPath,
    id: LogicalId,
    cidr: Ipv4Cidr,
    internet_gateway: Option<LogicalId>,
    subnets: Vec<Subnet>,
}

impl Vpc {
    /// Declares a VPC under `id` with one subnet per group and availability zone.
    ///
    /// Public groups get an internet gateway and a default route through it.
    ///
    /// # Errors
    ///
    /// Returns an error if the CIDR is invalid or larger than a `/16`, if no
    /// subnet groups or zones are requested, if group names repeat, or if
    /// the subnets do not fit.
    pub fn new(stack: &mut Stack, id: &str, props: &VpcProps) -> Result<Self> {
        let cidr = Ipv4Cidr::parse(&props.cidr)?;
        if cidr.prefix() < MIN_VPC_PREFIX {
            return Err(EdgestackError::config(format!(
                "VPC CIDR {cidr} is larger than /{MIN_VPC_PREFIX}"
            )));
        }
        if props.max_azs == 0 {
            return Err(EdgestackError::config("a VPC needs at least one availability zone"));
        }
        if props.subnet_configuration.is_empty() {
            return Err(EdgestackError::config("a VPC needs at least one subnet group"));
        }
        for (i, config) in props.subnet_configuration.iter().enumerate() {
            if props.subnet_configuration[..i].iter().any(|c| c.name == config.name) {
                return Err(EdgestackError::config(format!(
                    "duplicate subnet group name \"{}\"",
                    config.name
                )));
            }
        }

        let requests: Vec<Option<u8>> = props
            .subnet_configuration
            .iter()
            .flat_map(|c| std::iter::repeat_n(c.cidr_mask, props.max_azs))
            .collect();
        let mut blocks = cidr.carve(&requests)?.into_iter();

        let path = ConstructPath::root(id);
        let name_tag = json!([{"Key": "Name", "Value": format!("{}/{id}", stack.name())}]);
        let vpc_id = stack.add_resource(
            &path.child("Resource"),
            CfnResource::new("AWS::EC2::VPC").with_properties(json!({
                "CidrBlock": cidr.to_string(),
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": name_tag,
            })),
        )?;

        let has_public = props
            .subnet_configuration
            .iter()
            .any(|c| c.subnet_type == SubnetType::Public);
        let gateway = if has_public {
            let igw = stack.add_resource(
                &path.child("IGW"),
                CfnResource::new("AWS::EC2::InternetGateway").with_properties(json!({ "Tags": name_tag })),
            )?;
            let attachment = stack.add_resource(
                &path.child("VPCGW"),
                CfnResource::new("AWS::EC2::VPCGatewayAttachment").with_properties(json!({
                    "InternetGatewayId": intrinsic::reference(&igw),
                    "VpcId": intrinsic::reference(&vpc_id),
                })),
            )?;
            Some((igw, attachment))
        } else {
            None
        };

        let mut subnets = Vec::with_capacity(requests.len());
        for config in &props.subnet_configuration {
            for az_index in 0..props.max_azs {
                let block = blocks
                    .next()
                    .ok_or_else(|| EdgestackError::config("subnet allocation fell short"))?;
                let subnet_path = path.child(format!("{}Subnet{}", config.name, az_index + 1));
                let subnet = declare_subnet(
                    stack,
                    &subnet_path,
                    &vpc_id,
                    config,
                    az_index,
                    block,
                    gateway.as_ref(),
                )?;
                subnets.push(subnet);
            }
        }

        tracing::info!(
            stack = stack.name(),
            vpc = %vpc_id,
            %cidr,
            subnets = subnets.len(),
            "declared VPC"
        );
        Ok(Self {
            path,
            id: vpc_id,
            cidr,
            internet_gateway: gateway.map(|(igw, _)| igw),
            subnets,
        })
    }

    /// Construct path of the VPC.
    #[must_use]
    pub const fn path(&self) -> &ConstructPath {
        &self.path
    }

    /// Logical id of the VPC resource.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// `Ref` to the VPC.
    #[must_use]
    pub fn vpc_id(&self) -> Value {
        intrinsic::reference(&self.id)
    }

    /// Address range.
    #[must_use]
    pub const fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    /// Logical id of the internet gateway, if the VPC has public subnets.
    #[must_use]
    pub const fn internet_gateway(&self) -> Option<&LogicalId> {
        self.internet_gateway.as_ref()
    }

    /// All subnets in declaration order.
    #[must_use]
    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    /// Resolves a selection to concrete subnets.
    ///
    /// # Errors
    ///
    /// Returns an error if the selection matches no subnet.
    pub fn select_subnets(&self, selection: SubnetSelection) -> Result<Vec<&Subnet>> {
        let of_type =
            |t: SubnetType| self.subnets.iter().filter(|s| s.subnet_type == t).collect::<Vec<_>>();
        let selected = match selection {
            SubnetSelection::Type(t) => of_type(t),
            SubnetSelection::Default => {
                let isolated = of_type(SubnetType::Isolated);
                if isolated.is_empty() {
                    of_type(SubnetType::Public)
                } else {
                    isolated
                }
            }
        };
        if selected.is_empty() {
            return Err(EdgestackError::config(format!(
                "VPC {} has no subnets matching {selection:?}",
                self.path
            )));
        }
        Ok(selected)
    }

    /// `Ref`s to the selected subnets.
    ///
    /// # Errors
    ///
    /// Returns an error if the selection matches no subnet.
    pub fn subnet_ids(&self, selection: SubnetSelection) -> Result<Vec<Value>> {
        Ok(self
            .select_subnets(selection)?
            .into_iter()
            .map(Subnet::subnet_id)
            .collect())
    }
}

fn declare_subnet(
    stack: &mut Stack,
    path: &ConstructPath,
    vpc_id: &LogicalId,
    config: &SubnetConfiguration,
    az_index: usize,
    block: Ipv4Cidr,
    gateway: Option<&(LogicalId, LogicalId)>,
) -> Result<Subnet> {
    let public = config.subnet_type == SubnetType::Public;
    let tags = json!([
        {"Key": "Name", "Value": format!("{}/{path}", stack.name())},
        {"Key": "edgestack:subnet-name", "Value": config.name},
        {"Key": "edgestack:subnet-type", "Value": config.subnet_type.default_group_name()},
    ]);
    let id = stack.add_resource(
        &path.child("Subnet"),
        CfnResource::new("AWS::EC2::Subnet").with_properties(json!({
            "AvailabilityZone": intrinsic::select(az_index, intrinsic::get_azs()),
            "CidrBlock": block.to_string(),
            "MapPublicIpOnLaunch": public,
            "Tags": tags,
            "VpcId": intrinsic::reference(vpc_id),
        })),
    )?;
    let route_table = stack.add_resource(
        &path.child("RouteTable"),
        CfnResource::new("AWS::EC2::RouteTable").with_properties(json!({
            "Tags": [{"Key": "Name", "Value": format!("{}/{path}", stack.name())}],
            "VpcId": intrinsic::reference(vpc_id),
        })),
    )?;
    let _ = stack.add_resource(
        &path.child("RouteTableAssociation"),
        CfnResource::new("AWS::EC2::SubnetRouteTableAssociation").with_properties(json!({
            "RouteTableId": intrinsic::reference(&route_table),
            "SubnetId": intrinsic::reference(&id),
        })),
    )?;
    if let (true, Some((igw, attachment))) = (public, gateway) {
        let mut route = CfnResource::new("AWS::EC2::Route").with_properties(json!({
            "DestinationCidrBlock": "0.0.0.0/0",
            "GatewayId": intrinsic::reference(igw),
            "RouteTableId": intrinsic::reference(&route_table),
        }));
        route.add_dependency(attachment);
        let _ = stack.add_resource(&path.child("DefaultRoute"), route)?;
    }
    tracing::debug!(subnet = %id, cidr = %block, az_index, "declared subnet");
    Ok(Subnet {
        id,
        route_table,
        subnet_type: config.subnet_type,
        group: config.name.clone(),
        az_index,
        cidr: block,
    })
}
