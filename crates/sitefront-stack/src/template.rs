//! CloudFormation template rendering for a static website stack.
//!
//! One stack holds:
//! - the private, versioned origin bucket
//! - an Origin Access Control limiting bucket reads to the distribution
//! - the CloudFront distribution
//! - the bucket policy granting the distribution `s3:GetObject`
//! - three outputs consumed by the deploy pipeline
//! - in dev mode, a custom resource that empties the bucket before deletion

use crate::descriptor::DeploymentDescriptor;
use crate::naming::{
    SiteNames, BUCKET_NAME_OUTPUT, DISTRIBUTION_HOST_NAME_OUTPUT, DISTRIBUTION_ID_OUTPUT,
};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Noncurrent object versions are permanently deleted after this many days.
pub const NONCURRENT_VERSION_EXPIRATION_DAYS: u32 = 30;

/// Custom resource type that empties a bucket when the stack is deleted.
pub const AUTO_DELETE_OBJECTS_TYPE: &str = "Custom::S3AutoDeleteObjects";

const AUTO_DELETE_RUNTIME: &str = "python3.12";

// Deletes every object version on stack deletion. Inline code gets the
// `cfnresponse` module from CloudFormation.
const AUTO_DELETE_HANDLER_SOURCE: &str = r#"import boto3
import cfnresponse


def handler(event, context):
    status = cfnresponse.SUCCESS
    try:
        if event["RequestType"] == "Delete":
            s3 = boto3.resource("s3")
            bucket = s3.Bucket(event["ResourceProperties"]["BucketName"])
            try:
                bucket.object_versions.delete()
            except s3.meta.client.exceptions.NoSuchBucket:
                pass
    except Exception as err:
        print(err)
        status = cfnresponse.FAILED
    cfnresponse.send(event, context, status, {})
"#;

pub const DEFAULT_ROOT_OBJECT: &str = "index.html";

const DESCRIPTION_WARNING: &str = "Warning - If distribution is deleted, delete any associated DNS records before the distribution is recreated.";

// AWS managed policy ids.
const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
const CORS_S3_ORIGIN_REQUEST_POLICY_ID: &str = "88a5eaf4-2fd4-4709-b370-b4c650ea3fcf";
const CORS_PREFLIGHT_SECURITY_HEADERS_POLICY_ID: &str = "eaab4381-ed33-4a86-88ca-d9558dc6cd63";

/// How viewers may reach the distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewerProtocolPolicy {
    #[serde(rename = "redirect-to-https")]
    RedirectToHttps,
    #[serde(rename = "allow-all")]
    AllowAll,
}

/// A custom error response served by the distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorResponse {
    pub error_code: u16,
    pub response_code: u16,
    pub response_page_path: &'static str,
    #[serde(rename = "ErrorCachingMinTTL")]
    pub error_caching_min_ttl: u32,
}

/// 403 (page reload) and 404 (unknown path) both fall back to the index so
/// front-end routing keeps working.
pub const ERROR_RESPONSES: [ErrorResponse; 2] = [
    ErrorResponse {
        error_code: 403,
        response_code: 200,
        response_page_path: "/index.html",
        error_caching_min_ttl: 60,
    },
    ErrorResponse {
        error_code: 404,
        response_code: 200,
        response_page_path: "/index.html",
        error_caching_min_ttl: 60,
    },
];

/// A rendered stack, ready to be written to disk or handed to a deployer.
#[derive(Debug, Clone)]
pub struct StackTemplate {
    pub names: SiteNames,
    pub body: Value,
}

impl StackTemplate {
    pub fn stack_name(&self) -> &str {
        &self.names.stack_name
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Value> {
        self.body.get("Resources")?.get(logical_id)
    }

    pub fn output(&self, key: &str) -> Option<&Value> {
        self.body.get("Outputs")?.get(key)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.body)
    }
}

/// Render the CloudFormation template for one validated descriptor.
pub fn render(stack_prefix: &str, descriptor: &DeploymentDescriptor) -> StackTemplate {
    let names = SiteNames::derive(stack_prefix, &descriptor.website_url);

    let bucket_id = names.resource("Bucket");
    let oac_id = names.resource("Oac");
    let cdn_id = names.resource("Cdn");
    let policy_id = names.resource("BucketPolicy");

    let mut resources = Map::new();
    resources.insert(bucket_id.clone(), bucket(&names, descriptor.dev_mode));
    resources.insert(oac_id.clone(), origin_access_control(&names));
    resources.insert(
        cdn_id.clone(),
        distribution(&names, descriptor, &bucket_id, &oac_id),
    );
    resources.insert(policy_id.clone(), bucket_policy(&bucket_id, &cdn_id));

    if descriptor.dev_mode {
        auto_delete_objects(&names, &bucket_id, &policy_id, &mut resources);
    }

    let body = json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Description": format!("Static website {}", descriptor.website_url),
        "Resources": resources,
        "Outputs": outputs(&names, &bucket_id, &cdn_id),
    });

    StackTemplate { names, body }
}

fn bucket(names: &SiteNames, dev_mode: bool) -> Value {
    let deletion_policy = if dev_mode { "Delete" } else { "Retain" };

    json!({
        "Type": "AWS::S3::Bucket",
        "DeletionPolicy": deletion_policy,
        "UpdateReplacePolicy": deletion_policy,
        "Properties": {
            "BucketName": names.bucket_name,
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            },
            "BucketEncryption": {
                "ServerSideEncryptionConfiguration": [{
                    "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" }
                }]
            },
            "VersioningConfiguration": { "Status": "Enabled" },
            "LifecycleConfiguration": {
                "Rules": [{
                    "Id": format!(
                        "{}-delete-noncurrent-after-{}-days",
                        names.construct_id, NONCURRENT_VERSION_EXPIRATION_DAYS
                    ),
                    "Status": "Enabled",
                    "NoncurrentVersionExpiration": {
                        "NoncurrentDays": NONCURRENT_VERSION_EXPIRATION_DAYS
                    },
                }]
            },
        }
    })
}

/// Lambda-backed custom resource that empties the bucket on stack deletion,
/// so a `DeletionPolicy: Delete` bucket can actually be removed.
fn auto_delete_objects(
    names: &SiteNames,
    bucket_id: &str,
    policy_id: &str,
    resources: &mut Map<String, Value>,
) {
    let role_id = names.resource("AutoDeleteObjectsRole");
    let handler_id = names.resource("AutoDeleteObjectsHandler");
    let bucket_arn = json!({ "Fn::GetAtt": [bucket_id, "Arn"] });
    let objects_arn = json!({ "Fn::Join": ["", [bucket_arn.clone(), "/*"]] });

    resources.insert(
        role_id.clone(),
        json!({
            "Type": "AWS::IAM::Role",
            "Properties": {
                "AssumeRolePolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": "lambda.amazonaws.com" },
                        "Action": "sts:AssumeRole",
                    }]
                },
                "ManagedPolicyArns": [{
                    "Fn::Sub": "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
                }],
                "Policies": [{
                    "PolicyName": "empty-bucket",
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [
                            {
                                "Effect": "Allow",
                                "Action": ["s3:ListBucket", "s3:ListBucketVersions"],
                                "Resource": bucket_arn,
                            },
                            {
                                "Effect": "Allow",
                                "Action": ["s3:DeleteObject", "s3:DeleteObjectVersion"],
                                "Resource": objects_arn,
                            }
                        ]
                    }
                }]
            }
        }),
    );

    resources.insert(
        handler_id.clone(),
        json!({
            "Type": "AWS::Lambda::Function",
            "Properties": {
                "Description": format!("Empties {} before the stack deletes it", names.bucket_name),
                "Runtime": AUTO_DELETE_RUNTIME,
                "Handler": "index.handler",
                "Timeout": 900,
                "MemorySize": 128,
                "Role": { "Fn::GetAtt": [role_id, "Arn"] },
                "Code": { "ZipFile": AUTO_DELETE_HANDLER_SOURCE },
            }
        }),
    );

    // Depends on the policy so it is torn down while the bucket is still reachable.
    resources.insert(
        names.resource("AutoDeleteObjects"),
        json!({
            "Type": AUTO_DELETE_OBJECTS_TYPE,
            "DependsOn": [policy_id],
            "DeletionPolicy": "Delete",
            "Properties": {
                "ServiceToken": { "Fn::GetAtt": [handler_id, "Arn"] },
                "BucketName": { "Ref": bucket_id },
            }
        }),
    );
}

fn origin_access_control(names: &SiteNames) -> Value {
    json!({
        "Type": "AWS::CloudFront::OriginAccessControl",
        "Properties": {
            "OriginAccessControlConfig": {
                "Name": format!("{}-oac", names.construct_id),
                "OriginAccessControlOriginType": "s3",
                "SigningBehavior": "always",
                "SigningProtocol": "sigv4",
                "Description": format!("OAC for website origin S3 bucket {}", names.construct_id),
            }
        }
    })
}

fn distribution(
    names: &SiteNames,
    descriptor: &DeploymentDescriptor,
    bucket_id: &str,
    oac_id: &str,
) -> Value {
    let origin_id = format!("{}-origin", names.construct_id);
    let viewer_protocol = if descriptor.force_http {
        ViewerProtocolPolicy::AllowAll
    } else {
        ViewerProtocolPolicy::RedirectToHttps
    };

    let mut config = json!({
        "Comment": format!("{} | {}", descriptor.website_description, DESCRIPTION_WARNING),
        "DefaultRootObject": DEFAULT_ROOT_OBJECT,
        "Enabled": true,
        "IPV6Enabled": true,
        "HttpVersion": "http2and3",
        "PriceClass": "PriceClass_100",
        "Origins": [{
            "Id": origin_id,
            "DomainName": { "Fn::GetAtt": [bucket_id, "RegionalDomainName"] },
            "S3OriginConfig": { "OriginAccessIdentity": "" },
            "OriginAccessControlId": { "Fn::GetAtt": [oac_id, "Id"] },
        }],
        "DefaultCacheBehavior": {
            "TargetOriginId": origin_id,
            "AllowedMethods": ["GET", "HEAD", "OPTIONS"],
            "CachedMethods": ["GET", "HEAD", "OPTIONS"],
            "CachePolicyId": CACHING_OPTIMIZED_POLICY_ID,
            "OriginRequestPolicyId": CORS_S3_ORIGIN_REQUEST_POLICY_ID,
            "ResponseHeadersPolicyId": CORS_PREFLIGHT_SECURITY_HEADERS_POLICY_ID,
            "Compress": true,
            "ViewerProtocolPolicy": viewer_protocol,
        },
        "CustomErrorResponses": ERROR_RESPONSES,
        "Restrictions": {
            "GeoRestriction": {
                "RestrictionType": "whitelist",
                "Locations": descriptor.effective_countries(),
            }
        },
    });

    // CloudFront only accepts aliases alongside a custom certificate.
    if descriptor.force_http {
        config["ViewerCertificate"] = json!({ "CloudFrontDefaultCertificate": true });
    } else {
        config["Aliases"] = json!([descriptor.website_url]);
        config["ViewerCertificate"] = json!({
            "AcmCertificateArn": descriptor.certificate_arn,
            "SslSupportMethod": "sni-only",
            "MinimumProtocolVersion": "TLSv1.2_2021",
        });
    }

    json!({
        "Type": "AWS::CloudFront::Distribution",
        "Properties": { "DistributionConfig": config }
    })
}

fn distribution_arn(cdn_id: &str) -> Value {
    json!({
        "Fn::Sub": format!(
            "arn:${{AWS::Partition}}:cloudfront::${{AWS::AccountId}}:distribution/${{{cdn_id}}}"
        )
    })
}

fn bucket_policy(bucket_id: &str, cdn_id: &str) -> Value {
    let bucket_arn = json!({ "Fn::GetAtt": [bucket_id, "Arn"] });
    let objects_arn = json!({ "Fn::Join": ["", [bucket_arn.clone(), "/*"]] });

    json!({
        "Type": "AWS::S3::BucketPolicy",
        "Properties": {
            "Bucket": { "Ref": bucket_id },
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [
                    {
                        "Sid": "EnforceTls",
                        "Effect": "Deny",
                        "Principal": { "AWS": "*" },
                        "Action": "s3:*",
                        "Resource": [bucket_arn, objects_arn.clone()],
                        "Condition": { "Bool": { "aws:SecureTransport": "false" } },
                    },
                    {
                        "Sid": "AllowCloudFrontRead",
                        "Effect": "Allow",
                        "Principal": { "Service": "cloudfront.amazonaws.com" },
                        "Action": "s3:GetObject",
                        "Resource": objects_arn,
                        "Condition": {
                            "StringEquals": { "AWS:SourceArn": distribution_arn(cdn_id) }
                        },
                    }
                ]
            }
        }
    })
}

fn outputs(names: &SiteNames, bucket_id: &str, cdn_id: &str) -> Value {
    let mut outputs = Map::new();
    let mut add = |prefix: &str, description: &str, value: Value| {
        outputs.insert(
            names.output_key(prefix),
            json!({
                "Description": description,
                "Value": value,
                "Export": { "Name": names.export_name(prefix) },
            }),
        );
    };

    add(BUCKET_NAME_OUTPUT, "S3 bucket name", json!({ "Ref": bucket_id }));
    add(
        DISTRIBUTION_ID_OUTPUT,
        "CloudFront distribution ID",
        json!({ "Ref": cdn_id }),
    );
    add(
        DISTRIBUTION_HOST_NAME_OUTPUT,
        "CloudFront domain name",
        json!({ "Fn::GetAtt": [cdn_id, "DomainName"] }),
    );

    Value::Object(outputs)
}
